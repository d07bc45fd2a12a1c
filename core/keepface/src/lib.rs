//! Identity preservation for virtual try-on.
//!
//! A generative model dresses the subject of a photo in a garment; this crate
//! checks that the subject's face survived and, when it did not, restores the
//! original face into the generated body with skin tone correction and
//! seamless blending.
//!
//! Face detection, face swapping, generation and face restoration are
//! external models plugged in through the traits in [`Capabilities`].
//!
//! # Example
//!
//! ```no_run
//! use keepface::{Capabilities, PreservationOrchestrator, PreservationPolicy, TryOnRequest};
//!
//! # fn analyzer() -> Box<dyn keepface::FaceAnalyzer> { unimplemented!() }
//! # fn generator() -> Box<dyn keepface::TryOnGenerator> { unimplemented!() }
//! let caps = Capabilities::new()
//!     .face_analyzer(analyzer())
//!     .generator(generator());
//! let orchestrator = PreservationOrchestrator::new(caps, PreservationPolicy::default()).unwrap();
//!
//! let person = image::open("person.jpg").unwrap().to_rgb8();
//! let garment = image::open("garment.jpg").unwrap().to_rgb8();
//! let result = orchestrator.process(&TryOnRequest::new(person, garment));
//! println!("{} ({:.3})", result.method(), result.face_similarity());
//! ```
#![warn(missing_docs)]

/// Face compositing: masks, alpha blending and seamless cloning.
pub mod blend;
mod capability;
/// Image decoding, encoding and resizing at the crate boundary.
pub mod codec;
/// RGB / CIE Lab conversion and skin tone values.
pub mod color;
/// Half-body display crop.
pub mod crop;
mod descriptor;
mod enhance;
mod error;
/// Face geometry and the face analysis capability.
pub mod face_analyzer;
mod generator;
mod insert;
mod orchestrator;
mod policy;
mod request;
mod restore;
mod result;
/// Embedding similarity scoring.
pub mod similarity;
mod skin_tone;

pub use capability::{
    Capabilities, CapabilityStatus, FaceHandle, FaceRestorer, FaceSwapper, Serialized,
    TryOnGenerator,
};
pub use color::SkinTone;
pub use descriptor::{select_main_face, FaceDescriptor, FaceDescriptorProvider};
pub use enhance::QualityEnhancer;
pub use error::{Capability, CapabilityError, KeepFaceError};
pub use face_analyzer::{DetectedFace, FaceAnalyzer, FaceBox, Landmark};
pub use generator::CompositeGenerator;
pub use insert::{insert_face, Insertion};
pub use orchestrator::PreservationOrchestrator;
pub use policy::PreservationPolicy;
pub use request::{DisplayMode, GarmentCategory, GenerationParams, TryOnRequest};
pub use restore::{correct_skin_tone, IdentityRestorer, Restoration};
pub use result::{MethodTrail, ProcessingResult, ResultMetadata, Stage};
pub use skin_tone::{SkinChromaBounds, SkinToneExtractor};
