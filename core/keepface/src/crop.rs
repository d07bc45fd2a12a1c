use image::{imageops, RgbImage};

use crate::face_analyzer::FaceBox;

/// Headroom kept above the face, as a multiple of face height.
const HEADROOM: f64 = 0.5;

/// Body kept below the face centre, as a multiple of face height.
const BODY_BELOW_CENTER: f64 = 4.0;

/// Crop region within the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRegion {
    /// Copy this region out of `image`.
    pub fn extract(&self, image: &RgbImage) -> RgbImage {
        imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }

    /// Whether the pixel `(x, y)` lies inside the region.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Half-body display region for a face: full width, from half a face above
/// the face top down to four face heights below the face centre, clamped to
/// the image.
pub fn half_body_region(image_width: u32, image_height: u32, face: &FaceBox) -> Option<CropRegion> {
    if image_width == 0 || image_height == 0 {
        return None;
    }

    let face_h = face.height() as f64;
    let (_, center_y) = face.center();

    let top = (face.y1 as f64 - HEADROOM * face_h)
        .round()
        .clamp(0.0, image_height as f64) as u32;
    let bottom = (center_y as f64 + BODY_BELOW_CENTER * face_h)
        .round()
        .clamp(0.0, image_height as f64) as u32;

    if bottom <= top {
        return None;
    }

    Some(CropRegion {
        x: 0,
        y: top,
        width: image_width,
        height: bottom - top,
    })
}

/// Crop `image` to the half-body region around `face`.
///
/// Returns the image unchanged when the face lies entirely outside it.
pub fn crop_half_body(image: &RgbImage, face: &FaceBox) -> RgbImage {
    match half_body_region(image.width(), image.height(), face) {
        Some(region) => region.extract(image),
        None => image.clone(),
    }
}
