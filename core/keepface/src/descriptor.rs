use image::RgbImage;
use tracing::debug;

use crate::color::SkinTone;
use crate::error::KeepFaceError;
use crate::face_analyzer::{DetectedFace, FaceAnalyzer, FaceBox, Landmark};
use crate::skin_tone::SkinToneExtractor;

/// Identity descriptor of the main face in one image.
///
/// Created fresh for each image the pipeline looks at and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDescriptor {
    /// Face location in source pixels.
    pub bounding_box: FaceBox,
    /// Five-point landmarks, forwarded to capabilities untouched.
    pub landmarks: [Landmark; 5],
    /// Identity embedding.
    pub embedding: Vec<f32>,
    /// Detector confidence in `[0, 1]`.
    pub detection_score: f32,
    /// Representative skin colour of the face region.
    pub skin_tone: SkinTone,
}

/// Turns face analyzer output into a [`FaceDescriptor`] for the main subject.
pub struct FaceDescriptorProvider<'a> {
    analyzer: &'a dyn FaceAnalyzer,
    tones: SkinToneExtractor,
}

impl<'a> FaceDescriptorProvider<'a> {
    /// Describe faces found by `analyzer`, with the default skin bounds.
    pub fn new(analyzer: &'a dyn FaceAnalyzer) -> Self {
        Self {
            analyzer,
            tones: SkinToneExtractor::default(),
        }
    }

    /// Use a custom skin tone extractor.
    pub fn with_tone_extractor(mut self, tones: SkinToneExtractor) -> Self {
        self.tones = tones;
        self
    }

    /// Describe the main face in `image`.
    ///
    /// Fails with [`KeepFaceError::NoFaceDetected`] when the analyzer finds
    /// nothing and [`KeepFaceError::Capability`] when the analyzer errors.
    pub fn extract(&self, image: &RgbImage) -> Result<FaceDescriptor, KeepFaceError> {
        let candidates = self.analyzer.detect(image)?;
        let count = candidates.len();
        let main = select_main_face(candidates).ok_or(KeepFaceError::NoFaceDetected)?;

        debug!(
            candidates = count,
            x1 = main.bbox.x1,
            y1 = main.bbox.y1,
            x2 = main.bbox.x2,
            y2 = main.bbox.y2,
            score = main.score,
            "selected main face"
        );

        let skin_tone = self.tones.tone_in(image, &main.bbox);
        Ok(FaceDescriptor {
            bounding_box: main.bbox,
            landmarks: main.landmarks,
            embedding: main.embedding,
            detection_score: main.score.clamp(0.0, 1.0),
            skin_tone,
        })
    }
}

/// Pick the face with the largest box area. On equal areas the earlier
/// candidate wins, so the choice only depends on detector output order.
pub fn select_main_face(candidates: Vec<DetectedFace>) -> Option<DetectedFace> {
    candidates
        .into_iter()
        .fold(None, |best: Option<DetectedFace>, candidate| match best {
            Some(best) if best.bbox.area() >= candidate.bbox.area() => Some(best),
            _ => Some(candidate),
        })
}
