use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::capability::TryOnGenerator;
use crate::error::{Capability, CapabilityError};
use crate::request::GenerationParams;

const GARMENT_WIDTH_RATIO: f32 = 0.6;
const GARMENT_HEIGHT_RATIO: f32 = 0.4;
const GARMENT_TOP_RATIO: f32 = 0.25;

/// Model-free try-on: pastes the resized garment over the torso.
///
/// Used when no generative model is loaded. The face is untouched, so it
/// scores as preserved without restoration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeGenerator;

impl TryOnGenerator for CompositeGenerator {
    fn generate(
        &self,
        person: &RgbImage,
        garment: &RgbImage,
        _params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError> {
        let (width, height) = person.dimensions();
        let garment_w = (width as f32 * GARMENT_WIDTH_RATIO) as u32;
        let garment_h = (height as f32 * GARMENT_HEIGHT_RATIO) as u32;
        if garment_w == 0 || garment_h == 0 || garment.width() == 0 || garment.height() == 0 {
            return Err(CapabilityError::new(
                Capability::Generation,
                "images too small to composite",
            ));
        }

        let resized = imageops::resize(garment, garment_w, garment_h, FilterType::Lanczos3);
        let x = (width - garment_w) / 2;
        let y = (height as f32 * GARMENT_TOP_RATIO) as u32;

        let mut out = person.clone();
        imageops::replace(&mut out, &resized, x as i64, y as i64);
        Ok(out)
    }
}
