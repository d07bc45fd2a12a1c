use std::fmt;

use thiserror::Error;

/// External model capability consumed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Face detector + identity embedder.
    FaceAnalysis,
    /// Face-swap model.
    FaceSwap,
    /// Generative try-on model.
    Generation,
    /// Face restoration / enhancement model.
    FaceRestoration,
}

impl Capability {
    /// Stable snake_case name, used in logs and status reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FaceAnalysis => "face_analysis",
            Capability::FaceSwap => "face_swap",
            Capability::Generation => "generation",
            Capability::FaceRestoration => "face_restoration",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an external capability implementation.
#[derive(Debug, Clone, Error)]
#[error("{capability} failed: {message}")]
pub struct CapabilityError {
    /// Which capability failed.
    pub capability: Capability,
    /// Backend-provided description.
    pub message: String,
}

impl CapabilityError {
    /// Build an error for `capability` with a backend message.
    pub fn new(capability: Capability, message: impl Into<String>) -> Self {
        Self {
            capability,
            message: message.into(),
        }
    }
}

/// Errors returned by keepface operations.
#[derive(Debug, Error)]
pub enum KeepFaceError {
    /// The analyzer found no face in the image.
    #[error("no face detected")]
    NoFaceDetected,

    /// An external capability reported a failure.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Input bytes are not a supported image.
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    /// The encoder rejected the image.
    #[error("failed to encode image: {0}")]
    EncodeError(String),

    /// An image has zero width or height.
    #[error("image dimensions are zero")]
    ZeroDimensions,

    /// A policy field is out of range or the policy text is malformed.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// A request parameter could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
