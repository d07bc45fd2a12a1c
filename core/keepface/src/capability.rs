//! External model capabilities and the context that carries them.
//!
//! Every model the pipeline consumes sits behind a `Send + Sync` trait. A
//! [`Capabilities`] value is built once at startup and shared by reference
//! with every request; any capability may be absent.

use image::RgbImage;
use parking_lot::Mutex;
use serde::Serialize;

use crate::descriptor::FaceDescriptor;
use crate::error::{Capability, CapabilityError};
use crate::face_analyzer::{DetectedFace, FaceAnalyzer};
use crate::request::GenerationParams;

/// An image together with the face found in it.
#[derive(Debug, Clone, Copy)]
pub struct FaceHandle<'a> {
    /// The image containing the face.
    pub image: &'a RgbImage,
    /// The face located in `image`.
    pub face: &'a FaceDescriptor,
}

impl<'a> FaceHandle<'a> {
    /// Pair an image with a face found in it.
    pub fn new(image: &'a RgbImage, face: &'a FaceDescriptor) -> Self {
        Self { image, face }
    }
}

/// Face-swap model: paints the identity of `source` onto the face in `target`.
pub trait FaceSwapper: Send + Sync {
    /// Returns a copy of `target.image` with its face replaced. The result
    /// must have the target's dimensions.
    fn swap(&self, target: FaceHandle<'_>, source: FaceHandle<'_>)
        -> Result<RgbImage, CapabilityError>;
}

/// Generative virtual try-on model.
pub trait TryOnGenerator: Send + Sync {
    /// Dress `person` in `garment`.
    fn generate(
        &self,
        person: &RgbImage,
        garment: &RgbImage,
        params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError>;
}

/// Face restoration model, applied to a face crop.
pub trait FaceRestorer: Send + Sync {
    /// Returns a restored version of the `face` crop, at any size.
    fn restore(&self, face: &RgbImage) -> Result<RgbImage, CapabilityError>;
}

/// The set of external models available to the pipeline.
///
/// ```
/// use keepface::{Capabilities, CompositeGenerator};
///
/// let caps = Capabilities::new().generator(Box::new(CompositeGenerator));
/// assert!(caps.status().generation);
/// assert!(!caps.status().face_analysis);
/// ```
#[derive(Default)]
pub struct Capabilities {
    face_analyzer: Option<Box<dyn FaceAnalyzer>>,
    generator: Option<Box<dyn TryOnGenerator>>,
    face_swapper: Option<Box<dyn FaceSwapper>>,
    face_restorer: Option<Box<dyn FaceRestorer>>,
}

impl Capabilities {
    /// An empty context with no models loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the face detector + embedder.
    pub fn face_analyzer(mut self, analyzer: Box<dyn FaceAnalyzer>) -> Self {
        self.face_analyzer = Some(analyzer);
        self
    }

    /// Install the try-on generator.
    pub fn generator(mut self, generator: Box<dyn TryOnGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Install the face-swap model.
    pub fn face_swapper(mut self, swapper: Box<dyn FaceSwapper>) -> Self {
        self.face_swapper = Some(swapper);
        self
    }

    /// Install the face restoration model.
    pub fn face_restorer(mut self, restorer: Box<dyn FaceRestorer>) -> Self {
        self.face_restorer = Some(restorer);
        self
    }

    /// The face analyzer, if loaded.
    pub fn analyzer(&self) -> Option<&dyn FaceAnalyzer> {
        self.face_analyzer.as_deref()
    }

    /// The generative try-on model, if loaded.
    pub fn try_on(&self) -> Option<&dyn TryOnGenerator> {
        self.generator.as_deref()
    }

    /// The face-swap model, if loaded.
    pub fn swapper(&self) -> Option<&dyn FaceSwapper> {
        self.face_swapper.as_deref()
    }

    /// The face restoration model, if loaded.
    pub fn restorer(&self) -> Option<&dyn FaceRestorer> {
        self.face_restorer.as_deref()
    }

    /// Whether a model for `capability` was installed.
    pub fn is_loaded(&self, capability: Capability) -> bool {
        match capability {
            Capability::FaceAnalysis => self.face_analyzer.is_some(),
            Capability::FaceSwap => self.face_swapper.is_some(),
            Capability::Generation => self.generator.is_some(),
            Capability::FaceRestoration => self.face_restorer.is_some(),
        }
    }

    /// Which models are loaded, e.g. for a health endpoint.
    pub fn status(&self) -> CapabilityStatus {
        CapabilityStatus {
            face_analysis: self.is_loaded(Capability::FaceAnalysis),
            face_swap: self.is_loaded(Capability::FaceSwap),
            generation: self.is_loaded(Capability::Generation),
            face_restoration: self.is_loaded(Capability::FaceRestoration),
        }
    }
}

/// Loaded/not-loaded flag per capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    /// Face detector + embedder.
    pub face_analysis: bool,
    /// Face-swap model.
    pub face_swap: bool,
    /// Generative try-on model.
    pub generation: bool,
    /// Face restoration model.
    pub face_restoration: bool,
}

/// Runs calls to the wrapped capability one at a time.
///
/// For backends that hold a single inference session which must not be
/// entered concurrently. Requests sharing a `Serialized` capability queue on
/// its lock; requests using other capabilities proceed in parallel.
pub struct Serialized<C> {
    inner: Mutex<C>,
}

impl<C> Serialized<C> {
    /// Wrap `inner` behind a lock.
    pub fn new(inner: C) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Unwrap the capability.
    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

impl<C: FaceAnalyzer> FaceAnalyzer for Serialized<C> {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
        self.inner.lock().detect(image)
    }
}

impl<C: FaceSwapper> FaceSwapper for Serialized<C> {
    fn swap(
        &self,
        target: FaceHandle<'_>,
        source: FaceHandle<'_>,
    ) -> Result<RgbImage, CapabilityError> {
        self.inner.lock().swap(target, source)
    }
}

impl<C: TryOnGenerator> TryOnGenerator for Serialized<C> {
    fn generate(
        &self,
        person: &RgbImage,
        garment: &RgbImage,
        params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError> {
        self.inner.lock().generate(person, garment, params)
    }
}

impl<C: FaceRestorer> FaceRestorer for Serialized<C> {
    fn restore(&self, face: &RgbImage) -> Result<RgbImage, CapabilityError> {
        self.inner.lock().restore(face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Invert;

    impl FaceRestorer for Invert {
        fn restore(&self, face: &RgbImage) -> Result<RgbImage, CapabilityError> {
            let mut out = face.clone();
            image::imageops::invert(&mut out);
            Ok(out)
        }
    }

    #[test]
    fn empty_context_reports_nothing_loaded() {
        let caps = Capabilities::new();
        assert_eq!(
            caps.status(),
            CapabilityStatus {
                face_analysis: false,
                face_swap: false,
                generation: false,
                face_restoration: false,
            }
        );
        assert!(caps.restorer().is_none());
    }

    #[test]
    fn installed_capability_is_reachable() {
        let caps = Capabilities::new().face_restorer(Box::new(Invert));
        assert!(caps.is_loaded(Capability::FaceRestoration));
        let out = caps
            .restorer()
            .unwrap()
            .restore(&RgbImage::from_pixel(1, 1, image::Rgb([0, 10, 255])))
            .unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [255, 245, 0]);
    }

    struct Exclusive {
        inside: AtomicUsize,
        overlaps: AtomicUsize,
    }

    impl FaceRestorer for Exclusive {
        fn restore(&self, face: &RgbImage) -> Result<RgbImage, CapabilityError> {
            if self.inside.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
            self.inside.fetch_sub(1, Ordering::SeqCst);
            Ok(face.clone())
        }
    }

    #[test]
    fn serialized_never_overlaps_calls() {
        let restorer = Serialized::new(Exclusive {
            inside: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        });
        let face = RgbImage::new(2, 2);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..5 {
                        restorer.restore(&face).unwrap();
                    }
                });
            }
        });
        assert_eq!(restorer.into_inner().overlaps.load(Ordering::SeqCst), 0);
    }
}
