use image::RgbImage;

use crate::crop::CropRegion;
use crate::error::CapabilityError;

/// Bounding box of a face in source-image pixel coordinates.
///
/// Always satisfies `x1 < x2` and `y1 < y2`; may extend past the image edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceBox {
    /// Left edge (inclusive).
    pub x1: i32,
    /// Top edge (inclusive).
    pub y1: i32,
    /// Right edge (exclusive).
    pub x2: i32,
    /// Bottom edge (exclusive).
    pub y2: i32,
}

impl FaceBox {
    /// Build a box from its corners, or `None` if it has no area.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// Build a box from its top-left corner and size.
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Option<Self> {
        Self::new(x, y, x.checked_add(width)?, y.checked_add(height)?)
    }

    /// Width in pixels.
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    /// Height in pixels.
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Area in square pixels.
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Centre point `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x1 + self.x2) as f32 / 2.0,
            (self.y1 + self.y2) as f32 / 2.0,
        )
    }

    /// Grow the box on every side by `fraction` of its width.
    pub fn padded(&self, fraction: f32) -> FaceBox {
        let pad = (self.width() as f32 * fraction.max(0.0)).round() as i32;
        FaceBox {
            x1: self.x1.saturating_sub(pad),
            y1: self.y1.saturating_sub(pad),
            x2: self.x2.saturating_add(pad),
            y2: self.y2.saturating_add(pad),
        }
    }

    /// Grow the box by `margin` pixels on every side.
    pub fn expanded(&self, margin: i32) -> FaceBox {
        let margin = margin.max(0);
        FaceBox {
            x1: self.x1.saturating_sub(margin),
            y1: self.y1.saturating_sub(margin),
            x2: self.x2.saturating_add(margin),
            y2: self.y2.saturating_add(margin),
        }
    }

    /// Intersect with a `width` × `height` image. `None` when nothing overlaps.
    pub fn clip(&self, width: u32, height: u32) -> Option<CropRegion> {
        let x1 = self.x1.max(0) as i64;
        let y1 = self.y1.max(0) as i64;
        let x2 = (self.x2 as i64).min(width as i64);
        let y2 = (self.y2 as i64).min(height as i64);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some(CropRegion {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// Facial keypoint. Five of them (eyes, nose, mouth corners) are passed
/// through to downstream capabilities and never interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    /// Horizontal position in pixels.
    pub x: f32,
    /// Vertical position in pixels.
    pub y: f32,
}

/// One face candidate reported by a [`FaceAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    /// Face location.
    pub bbox: FaceBox,
    /// Five-point landmarks.
    pub landmarks: [Landmark; 5],
    /// Identity embedding (conventionally 512-d).
    pub embedding: Vec<f32>,
    /// Detector confidence in `[0, 1]`.
    pub score: f32,
}

/// Pluggable face detection + embedding backend.
///
/// Implement this trait to connect an InsightFace-style analyzer (ONNX,
/// remote service, etc.) and pass it to
/// [`crate::Capabilities::face_analyzer`].
pub trait FaceAnalyzer: Send + Sync {
    /// Detect every face in `image`. An empty list means no face was found.
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(FaceBox::new(10, 10, 10, 20).is_none());
        assert!(FaceBox::new(10, 20, 30, 5).is_none());
        assert!(FaceBox::from_xywh(0, 0, 0, 5).is_none());
    }

    #[test]
    fn geometry() {
        let face = FaceBox::from_xywh(100, 100, 50, 60).unwrap();
        assert_eq!(face.width(), 50);
        assert_eq!(face.height(), 60);
        assert_eq!(face.area(), 3000);
        assert_eq!(face.center(), (125.0, 130.0));
    }

    #[test]
    fn padding_uses_width_on_every_side() {
        let face = FaceBox::new(100, 100, 200, 250).unwrap();
        let padded = face.padded(0.1);
        assert_eq!(padded, FaceBox::new(90, 90, 210, 260).unwrap());
    }

    #[test]
    fn clip_to_image_bounds() {
        let face = FaceBox::new(-20, 10, 50, 300).unwrap();
        let region = face.clip(40, 100).unwrap();
        assert_eq!(
            region,
            CropRegion {
                x: 0,
                y: 10,
                width: 40,
                height: 90
            }
        );
    }

    #[test]
    fn clip_outside_image_is_none() {
        let face = FaceBox::new(120, 10, 150, 40).unwrap();
        assert!(face.clip(100, 100).is_none());
    }
}
