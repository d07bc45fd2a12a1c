use image::{Rgb, RgbImage};
use tracing::{debug, warn};

use crate::blend::{blend_face, BlendMethod, FaceMask};
use crate::capability::{FaceHandle, FaceSwapper};
use crate::color::SkinTone;
use crate::descriptor::FaceDescriptor;
use crate::face_analyzer::FaceBox;
use crate::policy::PreservationPolicy;
use crate::result::Stage;
use crate::skin_tone::SkinToneExtractor;

/// Output of [`IdentityRestorer::restore`].
#[derive(Debug, Clone)]
pub struct Restoration {
    /// The restored image, or the best intermediate when a step failed.
    pub image: RgbImage,
    /// Labels for the steps that ran, in order.
    pub stages: Vec<Stage>,
    /// Whether the swap itself succeeded. Only then is re-scoring meaningful.
    pub swapped: bool,
}

/// Re-inserts the source identity into a generated image: swap, skin tone
/// correction, then blending back over the generated image.
pub struct IdentityRestorer<'a> {
    swapper: &'a dyn FaceSwapper,
    policy: &'a PreservationPolicy,
    tones: SkinToneExtractor,
}

impl<'a> IdentityRestorer<'a> {
    /// Restore through `swapper`, with tone and blend settings from `policy`.
    pub fn new(swapper: &'a dyn FaceSwapper, policy: &'a PreservationPolicy) -> Self {
        Self {
            swapper,
            policy,
            tones: SkinToneExtractor::default(),
        }
    }

    /// Use a custom skin tone extractor.
    pub fn with_tone_extractor(mut self, tones: SkinToneExtractor) -> Self {
        self.tones = tones;
        self
    }

    /// Restore `source_face` into `target_image` at `target_face`.
    ///
    /// Never fails. A failed swap returns the target unchanged with
    /// [`Stage::FaceSwapFailed`]; later steps degrade to whatever image
    /// the previous step produced.
    pub fn restore(
        &self,
        source_image: &RgbImage,
        source_face: &FaceDescriptor,
        target_image: &RgbImage,
        target_face: &FaceDescriptor,
    ) -> Restoration {
        let mut stages = Vec::with_capacity(3);

        let swapped = match self.swapper.swap(
            FaceHandle::new(target_image, target_face),
            FaceHandle::new(source_image, source_face),
        ) {
            Ok(image) if image.dimensions() == target_image.dimensions() => image,
            Ok(image) => {
                warn!(
                    got = ?image.dimensions(),
                    expected = ?target_image.dimensions(),
                    "face swap returned wrong size"
                );
                stages.push(Stage::FaceSwapFailed);
                return Restoration {
                    image: target_image.clone(),
                    stages,
                    swapped: false,
                };
            }
            Err(err) => {
                warn!(error = %err, "face swap failed");
                stages.push(Stage::FaceSwapFailed);
                return Restoration {
                    image: target_image.clone(),
                    stages,
                    swapped: false,
                };
            }
        };
        stages.push(Stage::FaceSwap);

        let face = &target_face.bounding_box;
        let corrected = match correct_skin_tone(
            &swapped,
            face,
            source_face.skin_tone,
            self.policy.tone_damping,
            self.policy.tone_padding,
            &self.tones,
        ) {
            Some(image) => {
                stages.push(Stage::ToneCorrected);
                image
            }
            None => {
                stages.push(Stage::ToneCorrectionSkipped);
                swapped
            }
        };

        let (width, height) = target_image.dimensions();
        let Some(mask) = FaceMask::ellipse(
            face,
            width,
            height,
            self.policy.blend_kernel,
            self.policy.blend_sigma,
        ) else {
            stages.push(Stage::BlendFailed);
            return Restoration {
                image: corrected,
                stages,
                swapped: true,
            };
        };

        let image = match blend_face(&corrected, target_image, &mask, self.policy.seamless_blend) {
            Ok((image, method)) => {
                stages.extend(blend_stages(method));
                image
            }
            Err(err) => {
                warn!(error = %err, "blend failed, keeping unblended swap");
                stages.push(Stage::BlendFailed);
                corrected
            }
        };

        Restoration {
            image,
            stages,
            swapped: true,
        }
    }
}

pub(crate) fn blend_stages(method: BlendMethod) -> &'static [Stage] {
    match method {
        BlendMethod::Seamless => &[Stage::SeamlessBlend],
        BlendMethod::Alpha => &[Stage::AlphaBlend],
        BlendMethod::AlphaFallback => &[Stage::SeamlessBlendFailed, Stage::AlphaBlend],
    }
}

/// Shift the colour of the padded face region part-way toward `toward`.
///
/// The current tone of the unpadded face is measured, and every pixel of the
/// face box grown by `padding` x face width is moved by `damping` times the
/// per-channel difference, clamped to `[0, 255]`. `None` when the face lies
/// outside the image.
pub fn correct_skin_tone(
    image: &RgbImage,
    face: &FaceBox,
    toward: SkinTone,
    damping: f32,
    padding: f32,
    tones: &SkinToneExtractor,
) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    face.clip(width, height)?;
    let region = face.padded(padding).clip(width, height)?;

    let current = tones.tone_in(image, face);
    let target = toward.channels();
    let now = current.channels();
    let shift: [f32; 3] =
        std::array::from_fn(|c| damping * (target[c] as f32 - now[c] as f32));

    debug!(
        current = ?now,
        target = ?target,
        shift = ?shift,
        "skin tone correction"
    );

    let mut out = image.clone();
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            let Rgb(p) = *out.get_pixel(x, y);
            let moved: [u8; 3] =
                std::array::from_fn(|c| (p[c] as f32 + shift[c]).round().clamp(0.0, 255.0) as u8);
            out.put_pixel(x, y, Rgb(moved));
        }
    }
    Some(out)
}
