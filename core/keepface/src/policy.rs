use serde::{Deserialize, Serialize};

use crate::error::KeepFaceError;

/// Similarity below which the original face is restored into the output.
pub const DEFAULT_RESTORE_THRESHOLD: f32 = 0.90;

/// Similarity at or above which a face counts as preserved (and is enhanced).
pub const DEFAULT_PRESERVE_THRESHOLD: f32 = 0.85;

/// Fraction of the skin tone difference corrected after a swap.
pub const DEFAULT_TONE_DAMPING: f32 = 0.5;

/// Padding around the face for tone correction, as a fraction of face width.
pub const DEFAULT_TONE_PADDING: f32 = 0.10;

/// Width of an inserted face relative to the target image width.
pub const DEFAULT_INSERT_WIDTH_RATIO: f32 = 0.25;

/// Vertical centre of an inserted face relative to the target image height.
pub const DEFAULT_INSERT_HEAD_Y: f32 = 0.15;

/// Similarity reported for a face inserted from scratch. Not measured.
pub const DEFAULT_INSERTED_SIMILARITY: f32 = 0.95;

/// Tunable thresholds and ratios for the preservation pipeline.
///
/// Defaults are the compatibility values; override individual knobs with the
/// builder setters or load a TOML file with [`PreservationPolicy::from_toml_str`].
///
/// ```
/// use keepface::PreservationPolicy;
///
/// let policy = PreservationPolicy::default()
///     .restore_threshold(0.92)
///     .seamless_blend(false);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreservationPolicy {
    /// Similarity below which the original face is restored (default 0.90).
    pub restore_threshold: f32,
    /// Similarity at or above which the face counts as preserved (default 0.85).
    pub preserve_threshold: f32,
    /// Fraction of the skin tone difference applied during correction.
    pub tone_damping: f32,
    /// Margin around the face shifted by tone correction, as a fraction of face width.
    pub tone_padding: f32,
    /// Width of an inserted face as a fraction of the image width.
    pub insert_width_ratio: f32,
    /// Vertical centre of an inserted face as a fraction of the image height.
    pub insert_head_y: f32,
    /// Similarity reported for an inserted face, which is not re-scored.
    pub inserted_similarity: f32,
    /// Gaussian kernel size (taps, odd) used to feather face masks.
    pub blend_kernel: u32,
    /// Sigma of the feathering gaussian.
    pub blend_sigma: f32,
    /// Use gradient-domain blending, falling back to alpha compositing.
    pub seamless_blend: bool,
    /// Context around the face handed to the enhancer, as a fraction of face width.
    pub enhance_padding: f32,
    /// Inputs larger than this are downscaled before generation.
    pub max_input_dimension: u32,
    /// Use the built-in composite generator when no generative model is loaded.
    pub composite_fallback: bool,
}

impl Default for PreservationPolicy {
    fn default() -> Self {
        Self {
            restore_threshold: DEFAULT_RESTORE_THRESHOLD,
            preserve_threshold: DEFAULT_PRESERVE_THRESHOLD,
            tone_damping: DEFAULT_TONE_DAMPING,
            tone_padding: DEFAULT_TONE_PADDING,
            insert_width_ratio: DEFAULT_INSERT_WIDTH_RATIO,
            insert_head_y: DEFAULT_INSERT_HEAD_Y,
            inserted_similarity: DEFAULT_INSERTED_SIMILARITY,
            blend_kernel: 21,
            blend_sigma: 10.0,
            seamless_blend: true,
            enhance_padding: 0.25,
            max_input_dimension: 1024,
            composite_fallback: true,
        }
    }
}

impl PreservationPolicy {
    /// Parse a policy from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, KeepFaceError> {
        let policy: Self =
            toml::from_str(input).map_err(|e| KeepFaceError::InvalidPolicy(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Serialize to TOML, e.g. to write out an editable default policy file.
    pub fn to_toml_string(&self) -> Result<String, KeepFaceError> {
        toml::to_string_pretty(self).map_err(|e| KeepFaceError::InvalidPolicy(e.to_string()))
    }

    /// Whether `similarity` counts as a preserved identity.
    pub fn is_preserved(&self, similarity: f32) -> bool {
        similarity >= self.preserve_threshold
    }

    /// Whether `similarity` is low enough to trigger restoration.
    pub fn needs_restoration(&self, similarity: f32) -> bool {
        similarity < self.restore_threshold
    }

    /// Check every knob is within its meaningful range.
    pub fn validate(&self) -> Result<(), KeepFaceError> {
        let unit = |name: &str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(KeepFaceError::InvalidPolicy(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )))
            }
        };

        unit("restore_threshold", self.restore_threshold)?;
        unit("preserve_threshold", self.preserve_threshold)?;
        if self.preserve_threshold == 0.0 {
            return Err(KeepFaceError::InvalidPolicy(
                "preserve_threshold must be > 0".to_string(),
            ));
        }
        unit("tone_damping", self.tone_damping)?;
        unit("tone_padding", self.tone_padding)?;
        unit("insert_head_y", self.insert_head_y)?;
        unit("inserted_similarity", self.inserted_similarity)?;
        unit("enhance_padding", self.enhance_padding)?;

        if !(self.insert_width_ratio > 0.0 && self.insert_width_ratio <= 1.0) {
            return Err(KeepFaceError::InvalidPolicy(format!(
                "insert_width_ratio must be in (0.0, 1.0], got {}",
                self.insert_width_ratio
            )));
        }
        if self.blend_kernel == 0 || self.blend_kernel % 2 == 0 {
            return Err(KeepFaceError::InvalidPolicy(format!(
                "blend_kernel must be odd, got {}",
                self.blend_kernel
            )));
        }
        if !(self.blend_sigma > 0.0 && self.blend_sigma.is_finite()) {
            return Err(KeepFaceError::InvalidPolicy(format!(
                "blend_sigma must be positive, got {}",
                self.blend_sigma
            )));
        }
        if self.max_input_dimension == 0 {
            return Err(KeepFaceError::InvalidPolicy(
                "max_input_dimension must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the similarity below which restoration runs (default: 0.90).
    pub fn restore_threshold(mut self, threshold: f32) -> Self {
        self.restore_threshold = threshold;
        self
    }

    /// Set the preservation / enhancement threshold (default: 0.85).
    pub fn preserve_threshold(mut self, threshold: f32) -> Self {
        self.preserve_threshold = threshold;
        self
    }

    /// Set the skin tone damping factor (default: 0.5).
    pub fn tone_damping(mut self, damping: f32) -> Self {
        self.tone_damping = damping;
        self
    }

    /// Set the tone correction padding (default: 0.10 of face width).
    pub fn tone_padding(mut self, padding: f32) -> Self {
        self.tone_padding = padding;
        self
    }

    /// Set the inserted face width ratio (default: 0.25 of image width).
    pub fn insert_width_ratio(mut self, ratio: f32) -> Self {
        self.insert_width_ratio = ratio;
        self
    }

    /// Set the inserted face vertical position (default: 0.15 of image height).
    pub fn insert_head_y(mut self, y: f32) -> Self {
        self.insert_head_y = y;
        self
    }

    /// Set the similarity assumed after a from-scratch insertion (default: 0.95).
    pub fn inserted_similarity(mut self, similarity: f32) -> Self {
        self.inserted_similarity = similarity;
        self
    }

    /// Set the mask feathering kernel size and sigma (default: 21, 10.0).
    pub fn blend_feather(mut self, kernel: u32, sigma: f32) -> Self {
        self.blend_kernel = kernel;
        self.blend_sigma = sigma;
        self
    }

    /// Enable or disable gradient-domain blending (default: true).
    pub fn seamless_blend(mut self, enable: bool) -> Self {
        self.seamless_blend = enable;
        self
    }

    /// Set the enhancement context padding (default: 0.25 of face width).
    pub fn enhance_padding(mut self, padding: f32) -> Self {
        self.enhance_padding = padding;
        self
    }

    /// Set the maximum input dimension (default: 1024).
    pub fn max_input_dimension(mut self, dimension: u32) -> Self {
        self.max_input_dimension = dimension;
        self
    }

    /// Enable or disable the built-in composite generator (default: true).
    pub fn composite_fallback(mut self, enable: bool) -> Self {
        self.composite_fallback = enable;
        self
    }
}
