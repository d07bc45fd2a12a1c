use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::warn;

use crate::capability::FaceRestorer;
use crate::error::{Capability, CapabilityError};
use crate::face_analyzer::FaceBox;

/// Runs a face restoration model over the face region of an image.
pub struct QualityEnhancer<'a> {
    restorer: &'a dyn FaceRestorer,
    padding: f32,
}

impl<'a> QualityEnhancer<'a> {
    /// `padding` is the context kept around the face, as a fraction of face width.
    pub fn new(restorer: &'a dyn FaceRestorer, padding: f32) -> Self {
        Self { restorer, padding }
    }

    /// Enhance the face at `face`, leaving the rest of the image untouched.
    pub fn try_enhance(&self, image: &RgbImage, face: &FaceBox) -> Result<RgbImage, CapabilityError> {
        let region = face
            .padded(self.padding)
            .clip(image.width(), image.height())
            .ok_or_else(|| {
                CapabilityError::new(Capability::FaceRestoration, "face lies outside the image")
            })?;

        let crop = region.extract(image);
        let mut restored = self.restorer.restore(&crop)?;
        if restored.width() == 0 || restored.height() == 0 {
            return Err(CapabilityError::new(
                Capability::FaceRestoration,
                "restorer returned an empty image",
            ));
        }
        // Restorers commonly upsample; bring the crop back to its slot.
        if restored.dimensions() != crop.dimensions() {
            restored = imageops::resize(&restored, crop.width(), crop.height(), FilterType::Lanczos3);
        }

        let mut out = image.clone();
        imageops::replace(&mut out, &restored, region.x as i64, region.y as i64);
        Ok(out)
    }

    /// Like [`Self::try_enhance`], but returns the input unchanged on failure.
    pub fn enhance(&self, image: &RgbImage, face: &FaceBox) -> RgbImage {
        match self.try_enhance(image, face) {
            Ok(enhanced) => enhanced,
            Err(err) => {
                warn!(error = %err, "enhancement failed, keeping image");
                image.clone()
            }
        }
    }
}
