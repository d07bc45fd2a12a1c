use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, info, info_span, warn};

use crate::capability::{Capabilities, FaceRestorer, FaceSwapper, TryOnGenerator};
use crate::codec::downscale_to_fit;
use crate::crop::crop_half_body;
use crate::descriptor::{FaceDescriptor, FaceDescriptorProvider};
use crate::enhance::QualityEnhancer;
use crate::error::KeepFaceError;
use crate::face_analyzer::{FaceAnalyzer, FaceBox};
use crate::generator::CompositeGenerator;
use crate::insert::insert_face;
use crate::policy::PreservationPolicy;
use crate::request::{DisplayMode, TryOnRequest};
use crate::restore::{blend_stages, IdentityRestorer};
use crate::result::{MethodTrail, ProcessingResult, Stage};
use crate::similarity;

/// Runs try-on requests end to end: generation, identity check, restoration,
/// enhancement and framing.
///
/// One orchestrator is built at startup and shared across threads; each
/// [`process`](Self::process) call owns all of its intermediate state.
pub struct PreservationOrchestrator {
    capabilities: Capabilities,
    policy: PreservationPolicy,
}

/// Capabilities resolved once per request.
struct Resolved<'a> {
    generator: &'a dyn TryOnGenerator,
    generator_stage: Stage,
    analyzer: Option<&'a dyn FaceAnalyzer>,
    swapper: Option<&'a dyn FaceSwapper>,
    restorer: Option<&'a dyn FaceRestorer>,
}

/// Image, score and face location carried between states.
struct Working {
    image: RgbImage,
    similarity: f32,
    face: Option<FaceBox>,
    trail: MethodTrail,
}

static COMPOSITE: CompositeGenerator = CompositeGenerator;

impl PreservationOrchestrator {
    /// Fails only if `policy` is out of range.
    pub fn new(
        capabilities: Capabilities,
        policy: PreservationPolicy,
    ) -> Result<Self, KeepFaceError> {
        policy.validate()?;
        Ok(Self {
            capabilities,
            policy,
        })
    }

    /// The validated policy in use.
    pub fn policy(&self) -> &PreservationPolicy {
        &self.policy
    }

    /// The models this orchestrator runs with.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Process one request. Never fails: fatal problems produce an error
    /// result carrying the original person image.
    pub fn process(&self, request: &TryOnRequest) -> ProcessingResult {
        let started = Instant::now();
        let span = info_span!("try_on", category = %request.params().category);
        let _guard = span.enter();

        let result = match self.run(request) {
            Ok(working) => ProcessingResult::new(
                working.image,
                working.similarity,
                working.trail,
                started.elapsed(),
                &self.policy,
            ),
            Err(reason) => {
                warn!(reason = %reason, "request failed");
                ProcessingResult::failed(request.person().clone(), reason, started.elapsed())
            }
        };

        info!(
            similarity = result.face_similarity(),
            preserved = result.face_preserved(),
            method = %result.method(),
            elapsed_ms = result.processing_time_ms(),
            "try-on finished"
        );
        result
    }

    fn resolve(&self) -> Result<Resolved<'_>, Stage> {
        let (generator, generator_stage) = match self.capabilities.try_on() {
            Some(generator) => (generator, Stage::Generator),
            None if self.policy.composite_fallback => {
                (&COMPOSITE as &dyn TryOnGenerator, Stage::CompositeFallback)
            }
            None => return Err(Stage::GeneratorUnavailable),
        };
        Ok(Resolved {
            generator,
            generator_stage,
            analyzer: self.capabilities.analyzer(),
            swapper: self.capabilities.swapper(),
            restorer: self.capabilities.restorer(),
        })
    }

    fn run(&self, request: &TryOnRequest) -> Result<Working, Stage> {
        let (person, garment) = (request.person(), request.garment());
        if person.width() == 0 || person.height() == 0 || garment.width() == 0 || garment.height() == 0
        {
            return Err(Stage::InvalidInput);
        }
        let caps = self.resolve()?;

        let person = downscale_to_fit(person.clone(), self.policy.max_input_dimension);
        let garment = downscale_to_fit(garment.clone(), self.policy.max_input_dimension);

        if !request.preserves_face() {
            let image = self.generate(&caps, &person, &garment, request)?;
            return Ok(Working {
                image,
                similarity: 0.0,
                face: None,
                trail: MethodTrail::from(vec![caps.generator_stage]),
            });
        }

        // DescribeOriginal
        let Some(analyzer) = caps.analyzer else {
            warn!("no face analyzer loaded, identity checks skipped");
            let image = self.generate(&caps, &person, &garment, request)?;
            return Ok(Working {
                image,
                similarity: 0.0,
                face: None,
                trail: MethodTrail::from(vec![caps.generator_stage, Stage::FaceAnalysisUnavailable]),
            });
        };
        let provider = FaceDescriptorProvider::new(analyzer);
        let original = match provider.extract(&person) {
            Ok(descriptor) => descriptor,
            Err(KeepFaceError::NoFaceDetected) => {
                info!("no face in person image, generating without identity checks");
                let image = self.generate(&caps, &person, &garment, request)?;
                return Ok(Working {
                    image,
                    similarity: 0.0,
                    face: None,
                    trail: MethodTrail::from(vec![Stage::NoFaceDetected]),
                });
            }
            Err(err) => {
                warn!(error = %err, "face analysis of person image failed");
                let image = self.generate(&caps, &person, &garment, request)?;
                return Ok(Working {
                    image,
                    similarity: 0.0,
                    face: None,
                    trail: MethodTrail::from(vec![caps.generator_stage, Stage::FaceAnalysisFailed]),
                });
            }
        };

        // Generate
        let generated = self.generate(&caps, &person, &garment, request)?;
        let mut working = Working {
            image: generated,
            similarity: 0.0,
            face: None,
            trail: MethodTrail::from(vec![caps.generator_stage]),
        };

        // DescribeGenerated
        match provider.extract(&working.image) {
            Ok(generated_face) => {
                self.evaluate(&caps, &provider, &person, &original, generated_face, &mut working)
            }
            Err(KeepFaceError::NoFaceDetected) => {
                self.insert(&person, &original, &mut working)
            }
            Err(err) => {
                warn!(error = %err, "face analysis of generated image failed");
                working.trail.push(Stage::FaceAnalysisFailed);
            }
        }

        // Enhance?
        if self.policy.is_preserved(working.similarity) {
            if let (Some(restorer), Some(face)) = (caps.restorer, working.face) {
                let enhancer = QualityEnhancer::new(restorer, self.policy.enhance_padding);
                match enhancer.try_enhance(&working.image, &face) {
                    Ok(image) => {
                        working.image = image;
                        working.trail.push(Stage::Enhanced);
                    }
                    Err(err) => {
                        warn!(error = %err, "enhancement failed, keeping image");
                        working.trail.push(Stage::EnhanceFailed);
                    }
                }
            }
        }

        // Crop?
        if request.mode() == DisplayMode::HalfBody {
            match working.face {
                Some(face) => {
                    working.image = crop_half_body(&working.image, &face);
                    working.trail.push(Stage::HalfBody);
                }
                None => debug!("no face location, half-body crop skipped"),
            }
        }

        Ok(working)
    }

    fn generate(
        &self,
        caps: &Resolved<'_>,
        person: &RgbImage,
        garment: &RgbImage,
        request: &TryOnRequest,
    ) -> Result<RgbImage, Stage> {
        let generated = caps
            .generator
            .generate(person, garment, request.params())
            .map_err(|err| {
                warn!(error = %err, "generation failed");
                Stage::GenerationFailed
            })?;
        if generated.width() == 0 || generated.height() == 0 {
            warn!("generator returned an empty image");
            return Err(Stage::GenerationFailed);
        }
        if generated.dimensions() != person.dimensions() {
            debug!(
                generated = ?generated.dimensions(),
                person = ?person.dimensions(),
                "resizing generated image to person size"
            );
            return Ok(imageops::resize(
                &generated,
                person.width(),
                person.height(),
                FilterType::Lanczos3,
            ));
        }
        Ok(generated)
    }

    fn evaluate(
        &self,
        caps: &Resolved<'_>,
        provider: &FaceDescriptorProvider<'_>,
        person: &RgbImage,
        original: &FaceDescriptor,
        generated_face: FaceDescriptor,
        working: &mut Working,
    ) {
        working.similarity = similarity::score(&original.embedding, &generated_face.embedding);
        working.face = Some(generated_face.bounding_box);
        info!(
            similarity = working.similarity,
            threshold = self.policy.restore_threshold,
            "identity check"
        );

        if !self.policy.needs_restoration(working.similarity) {
            return;
        }

        let Some(swapper) = caps.swapper else {
            warn!("no face swapper loaded, keeping generated face");
            working.trail.push(Stage::FaceSwapUnavailable);
            return;
        };

        let restoration = IdentityRestorer::new(swapper, &self.policy).restore(
            person,
            original,
            &working.image,
            &generated_face,
        );
        working.trail.extend(restoration.stages);
        working.image = restoration.image;
        if !restoration.swapped {
            return;
        }

        match provider.extract(&working.image) {
            Ok(restored_face) => {
                working.similarity =
                    similarity::score(&original.embedding, &restored_face.embedding);
                working.face = Some(restored_face.bounding_box);
                info!(similarity = working.similarity, "restored identity re-scored");
            }
            Err(err) => {
                warn!(error = %err, "re-scoring restored image failed, keeping prior score");
                working.trail.push(Stage::RescoreFailed);
            }
        }
    }

    fn insert(&self, person: &RgbImage, original: &FaceDescriptor, working: &mut Working) {
        info!("no face in generated image, inserting original face");
        working.trail.push(Stage::NoFaceInOutput);
        match insert_face(person, original, &working.image, &self.policy) {
            Some(insertion) => {
                working.image = insertion.image;
                working.similarity = self.policy.inserted_similarity;
                working.face = Some(insertion.face_box);
                working.trail.push(Stage::FaceInserted);
                working.trail.extend(blend_stages(insertion.method).iter().copied());
            }
            None => {
                warn!("face insertion failed");
                working.trail.push(Stage::FaceInsertFailed);
            }
        }
    }
}
