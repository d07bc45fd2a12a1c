use std::fmt;
use std::time::Duration;

use image::RgbImage;
use serde::Serialize;

use crate::policy::PreservationPolicy;

/// One pipeline branch that ran, recorded in order in a [`MethodTrail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Output came from the configured generative model.
    Generator,
    /// Output came from the built-in composite generator.
    CompositeFallback,
    /// The person photo had no detectable face; identity logic skipped.
    NoFaceDetected,
    /// No face analyzer is loaded; identity logic skipped.
    FaceAnalysisUnavailable,
    /// The analyzer errored; the generated image is kept unscored.
    FaceAnalysisFailed,
    /// The generated image had no detectable face.
    NoFaceInOutput,
    /// The original face was pasted into a faceless output.
    FaceInserted,
    /// Pasting the original face failed.
    FaceInsertFailed,
    /// The swap model restored the original identity.
    FaceSwap,
    /// The swap model errored or returned a bad image.
    FaceSwapFailed,
    /// Restoration was needed but no swap model is loaded.
    FaceSwapUnavailable,
    /// The face was shifted toward the original skin tone.
    ToneCorrected,
    /// The face lay outside the image, so no tone correction ran.
    ToneCorrectionSkipped,
    /// The face was blended in the gradient domain.
    SeamlessBlend,
    /// The gradient-domain blend failed.
    SeamlessBlendFailed,
    /// The face was alpha-composited.
    AlphaBlend,
    /// No blend was possible; the unblended face is kept.
    BlendFailed,
    /// The restored image could not be re-measured; pre-restoration score kept.
    RescoreFailed,
    /// The face restoration model ran on the face.
    Enhanced,
    /// Face restoration failed; the image is unchanged.
    EnhanceFailed,
    /// The output was cropped to the half-body frame.
    HalfBody,
    /// The request failed; the next stage names the reason.
    Error,
    /// The generator errored or returned an empty image.
    GenerationFailed,
    /// No generator is loaded and the composite fallback is disabled.
    GeneratorUnavailable,
    /// A request image was empty.
    InvalidInput,
}

impl Stage {
    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generator => "generator",
            Stage::CompositeFallback => "composite_fallback",
            Stage::NoFaceDetected => "no_face_detected",
            Stage::FaceAnalysisUnavailable => "face_analysis_unavailable",
            Stage::FaceAnalysisFailed => "face_analysis_failed",
            Stage::NoFaceInOutput => "no_face_in_output",
            Stage::FaceInserted => "face_inserted",
            Stage::FaceInsertFailed => "face_insert_failed",
            Stage::FaceSwap => "face_swap",
            Stage::FaceSwapFailed => "face_swap_failed",
            Stage::FaceSwapUnavailable => "face_swap_unavailable",
            Stage::ToneCorrected => "tone_corrected",
            Stage::ToneCorrectionSkipped => "tone_correction_skipped",
            Stage::SeamlessBlend => "seamless_blend",
            Stage::SeamlessBlendFailed => "seamless_blend_failed",
            Stage::AlphaBlend => "alpha_blend",
            Stage::BlendFailed => "blend_failed",
            Stage::RescoreFailed => "rescore_failed",
            Stage::Enhanced => "enhanced",
            Stage::EnhanceFailed => "enhance_failed",
            Stage::HalfBody => "half_body",
            Stage::Error => "error",
            Stage::GenerationFailed => "generation_failed",
            Stage::GeneratorUnavailable => "generator_unavailable",
            Stage::InvalidInput => "invalid_input",
        }
    }

    /// Whether this stage records a fallback rather than the intended path.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Stage::CompositeFallback
                | Stage::FaceAnalysisUnavailable
                | Stage::FaceAnalysisFailed
                | Stage::FaceInsertFailed
                | Stage::FaceSwapFailed
                | Stage::FaceSwapUnavailable
                | Stage::ToneCorrectionSkipped
                | Stage::SeamlessBlendFailed
                | Stage::BlendFailed
                | Stage::RescoreFailed
                | Stage::EnhanceFailed
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the branches a request went through, rendered as
/// `+`-joined labels, e.g. `generator+face_swap+tone_corrected+seamless_blend`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTrail(Vec<Stage>);

impl MethodTrail {
    /// An empty trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `stage` after the existing ones.
    pub fn push(&mut self, stage: Stage) {
        self.0.push(stage);
    }

    /// The recorded stages, in order.
    pub fn stages(&self) -> &[Stage] {
        &self.0
    }

    /// Whether `stage` was recorded.
    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    /// Whether any recorded stage is a fallback.
    pub fn is_degraded(&self) -> bool {
        self.0.iter().any(Stage::is_degraded)
    }
}

impl Extend<Stage> for MethodTrail {
    fn extend<T: IntoIterator<Item = Stage>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl From<Vec<Stage>> for MethodTrail {
    fn from(stages: Vec<Stage>) -> Self {
        Self(stages)
    }
}

impl fmt::Display for MethodTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            f.write_str(stage.as_str())?;
        }
        Ok(())
    }
}

impl Serialize for MethodTrail {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one try-on request.
///
/// `face_preserved` is derived from `face_similarity` at construction and
/// cannot be set independently.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    image: RgbImage,
    face_preserved: bool,
    face_similarity: f32,
    processing_time_ms: u64,
    method: MethodTrail,
}

impl ProcessingResult {
    pub(crate) fn new(
        image: RgbImage,
        face_similarity: f32,
        method: MethodTrail,
        elapsed: Duration,
        policy: &PreservationPolicy,
    ) -> Self {
        let face_similarity = if face_similarity.is_finite() {
            face_similarity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            image,
            face_preserved: policy.is_preserved(face_similarity),
            face_similarity,
            processing_time_ms: elapsed.as_millis().min(u64::MAX as u128) as u64,
            method,
        }
    }

    /// A failed request: the original image, zero similarity, and a trail
    /// starting with `error`.
    pub(crate) fn failed(original: RgbImage, reason: Stage, elapsed: Duration) -> Self {
        Self {
            image: original,
            face_preserved: false,
            face_similarity: 0.0,
            processing_time_ms: elapsed.as_millis().min(u64::MAX as u128) as u64,
            method: MethodTrail(vec![Stage::Error, reason]),
        }
    }

    /// Final composite.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Take ownership of the final composite.
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Whether `face_similarity` reached the policy's preserve threshold.
    pub fn face_preserved(&self) -> bool {
        self.face_preserved
    }

    /// Identity similarity between the original and final faces, in `[0, 1]`.
    pub fn face_similarity(&self) -> f32 {
        self.face_similarity
    }

    /// Wall-clock time spent in the pipeline.
    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    /// The branches the request went through.
    pub fn method(&self) -> &MethodTrail {
        &self.method
    }

    /// Whether the request ended in the error state.
    pub fn is_error(&self) -> bool {
        self.method.stages().first() == Some(&Stage::Error)
    }

    /// Serializable summary without the image.
    pub fn metadata(&self) -> ResultMetadata {
        ResultMetadata {
            face_preserved: self.face_preserved,
            face_similarity: self.face_similarity,
            processing_time_ms: self.processing_time_ms,
            method: self.method.clone(),
        }
    }
}

/// Image-free view of a [`ProcessingResult`], e.g. for a JSON response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    /// See [`ProcessingResult::face_preserved`].
    pub face_preserved: bool,
    /// See [`ProcessingResult::face_similarity`].
    pub face_similarity: f32,
    /// See [`ProcessingResult::processing_time_ms`].
    pub processing_time_ms: u64,
    /// See [`ProcessingResult::method`].
    pub method: MethodTrail,
}
