use image::RgbImage;
use tracing::trace;

use crate::color::{lab_to_rgb, rgb_to_lab, Lab, SkinTone};
use crate::face_analyzer::FaceBox;

/// Lab bounds a pixel must fall within to count as skin.
///
/// Wide enough for the full range of human skin under ordinary lighting,
/// narrow enough to reject hair, eyes, teeth and grey/blue backgrounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinChromaBounds {
    /// Inclusive L* range.
    pub lightness: (f32, f32),
    /// Inclusive a* range.
    pub a: (f32, f32),
    /// Inclusive b* range.
    pub b: (f32, f32),
}

impl Default for SkinChromaBounds {
    fn default() -> Self {
        Self {
            lightness: (20.0, 98.0),
            a: (4.0, 35.0),
            b: (5.0, 45.0),
        }
    }
}

impl SkinChromaBounds {
    fn admits(&self, lab: &Lab) -> bool {
        (self.lightness.0..=self.lightness.1).contains(&lab.l)
            && (self.a.0..=self.a.1).contains(&lab.a)
            && (self.b.0..=self.b.1).contains(&lab.b)
    }
}

/// Derives a representative skin colour from a face region.
///
/// Never fails: an empty region yields [`SkinTone::DEFAULT`], a region
/// without skin-like pixels yields the median of its central ninth.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkinToneExtractor {
    bounds: SkinChromaBounds,
}

impl SkinToneExtractor {
    /// Extractor admitting pixels within `bounds`.
    pub fn new(bounds: SkinChromaBounds) -> Self {
        Self { bounds }
    }

    /// Skin tone of an already-cropped face region.
    pub fn tone(&self, region: &RgbImage) -> SkinTone {
        if region.width() == 0 || region.height() == 0 {
            return SkinTone::DEFAULT;
        }

        let skin: Vec<Lab> = region
            .pixels()
            .map(|p| rgb_to_lab(p.0))
            .filter(|lab| self.bounds.admits(lab))
            .collect();

        if skin.is_empty() {
            trace!(
                width = region.width(),
                height = region.height(),
                "no skin-chroma pixels, using central region"
            );
            return central_median(region);
        }

        let l = median_f32(skin.iter().map(|lab| lab.l).collect());
        let a = median_f32(skin.iter().map(|lab| lab.a).collect());
        let b = median_f32(skin.iter().map(|lab| lab.b).collect());
        let [r, g, b] = lab_to_rgb(Lab { l, a, b });
        SkinTone::new(r, g, b)
    }

    /// Skin tone of `face` within `image`; regions outside the image count
    /// as empty.
    pub fn tone_in(&self, image: &RgbImage, face: &FaceBox) -> SkinTone {
        match face.clip(image.width(), image.height()) {
            Some(region) => self.tone(&region.extract(image)),
            None => SkinTone::DEFAULT,
        }
    }
}

/// Per-channel median of the central third-by-third sub-rectangle.
fn central_median(region: &RgbImage) -> SkinTone {
    let (w, h) = region.dimensions();
    let (x0, y0) = (w / 3, h / 3);
    let x1 = (2 * w / 3).max(x0 + 1);
    let y1 = (2 * h / 3).max(y0 + 1);

    let mut channels: [Vec<u8>; 3] = Default::default();
    for y in y0..y1 {
        for x in x0..x1 {
            let p = region.get_pixel(x, y).0;
            for (c, values) in channels.iter_mut().enumerate() {
                values.push(p[c]);
            }
        }
    }

    let [r, g, b] = channels.map(median_u8);
    SkinTone::new(r, g, b)
}

fn median_f32(mut values: Vec<f32>) -> f32 {
    values.sort_unstable_by(f32::total_cmp);
    values[values.len() / 2]
}

fn median_u8(mut values: Vec<u8>) -> u8 {
    values.sort_unstable();
    values[values.len() / 2]
}
