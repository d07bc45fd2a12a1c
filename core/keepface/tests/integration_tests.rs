use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use keepface::{
    Capabilities, Capability, CapabilityError, DetectedFace, DisplayMode, FaceAnalyzer, FaceBox,
    FaceHandle, FaceRestorer, FaceSwapper, GenerationParams, Landmark, PreservationOrchestrator,
    PreservationPolicy, ProcessingResult, Serialized, Stage, TryOnGenerator, TryOnRequest,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

const SKIN: [u8; 3] = [200, 150, 130];
const BACKDROP: [u8; 3] = [40, 80, 200];

fn face_box() -> FaceBox {
    FaceBox::new(80, 60, 160, 160).unwrap()
}

/// 240x320 portrait: flat skin patch over the face box on a blue backdrop.
fn person() -> RgbImage {
    let face = face_box();
    RgbImage::from_fn(240, 320, |x, y| {
        let (x, y) = (x as i32, y as i32);
        if x >= face.x1 && x < face.x2 && y >= face.y1 && y < face.y2 {
            Rgb(SKIN)
        } else {
            Rgb(BACKDROP)
        }
    })
}

fn garment() -> RgbImage {
    RgbImage::from_pixel(40, 40, Rgb([10, 160, 30]))
}

fn request() -> TryOnRequest {
    TryOnRequest::new(person(), garment())
}

#[derive(Clone)]
enum Detection {
    Face(Vec<f32>),
    NoFace,
    Fail,
}

/// Answers each `detect` call with the next scripted detection.
struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Detection>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    fn new(script: Vec<Detection>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let analyzer = Self {
            script: Mutex::new(script.into()),
            calls: calls.clone(),
        };
        (analyzer, calls)
    }
}

fn detected(embedding: Vec<f32>) -> DetectedFace {
    DetectedFace {
        bbox: face_box(),
        landmarks: [Landmark::default(); 5],
        embedding,
        score: 0.98,
    }
}

impl FaceAnalyzer for ScriptedAnalyzer {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front().unwrap_or(Detection::NoFace) {
            Detection::Face(embedding) => Ok(vec![detected(embedding)]),
            Detection::NoFace => Ok(vec![]),
            Detection::Fail => Err(CapabilityError::new(
                Capability::FaceAnalysis,
                "detector crashed",
            )),
        }
    }
}

/// Always finds the same face; safe to share across threads.
struct SteadyAnalyzer;

impl FaceAnalyzer for SteadyAnalyzer {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
        Ok(vec![detected(vec![0.2, 0.4, 0.6])])
    }
}

/// Returns the person unchanged.
struct EchoGenerator;

impl TryOnGenerator for EchoGenerator {
    fn generate(
        &self,
        person: &RgbImage,
        _garment: &RgbImage,
        _params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError> {
        Ok(person.clone())
    }
}

/// Returns the person at half size.
struct HalfSizeGenerator;

impl TryOnGenerator for HalfSizeGenerator {
    fn generate(
        &self,
        person: &RgbImage,
        _garment: &RgbImage,
        _params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError> {
        Ok(image::imageops::thumbnail(
            person,
            person.width() / 2,
            person.height() / 2,
        ))
    }
}

struct FailingGenerator;

impl TryOnGenerator for FailingGenerator {
    fn generate(
        &self,
        _person: &RgbImage,
        _garment: &RgbImage,
        _params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError> {
        Err(CapabilityError::new(Capability::Generation, "CUDA out of memory"))
    }
}

struct CountingSwapper(Arc<AtomicUsize>);

impl FaceSwapper for CountingSwapper {
    fn swap(
        &self,
        target: FaceHandle<'_>,
        _source: FaceHandle<'_>,
    ) -> Result<RgbImage, CapabilityError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(target.image.clone())
    }
}

struct CountingRestorer(Arc<AtomicUsize>);

impl FaceRestorer for CountingRestorer {
    fn restore(&self, face: &RgbImage) -> Result<RgbImage, CapabilityError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(face.clone())
    }
}

struct Harness {
    orchestrator: PreservationOrchestrator,
    analyzer_calls: Arc<AtomicUsize>,
    swaps: Arc<AtomicUsize>,
    enhancements: Arc<AtomicUsize>,
}

/// Full capability set with a scripted analyzer and the echo generator.
fn harness(script: Vec<Detection>) -> Harness {
    harness_with(script, Box::new(EchoGenerator), PreservationPolicy::default())
}

fn harness_with(
    script: Vec<Detection>,
    generator: Box<dyn TryOnGenerator>,
    policy: PreservationPolicy,
) -> Harness {
    let (analyzer, analyzer_calls) = ScriptedAnalyzer::new(script);
    let swaps = Arc::new(AtomicUsize::new(0));
    let enhancements = Arc::new(AtomicUsize::new(0));
    let caps = Capabilities::new()
        .face_analyzer(Box::new(analyzer))
        .generator(generator)
        .face_swapper(Box::new(CountingSwapper(swaps.clone())))
        .face_restorer(Box::new(CountingRestorer(enhancements.clone())));
    Harness {
        orchestrator: PreservationOrchestrator::new(caps, policy).unwrap(),
        analyzer_calls,
        swaps,
        enhancements,
    }
}

fn original() -> Detection {
    Detection::Face(vec![1.0, 0.0])
}

/// cos = 0.9, similarity 0.95
fn close_match() -> Detection {
    Detection::Face(vec![0.9, 0.435_889_9])
}

/// cos = 0.6, similarity 0.80
fn weak_match() -> Detection {
    Detection::Face(vec![0.6, 0.8])
}

fn assert_preserved_invariant(result: &ProcessingResult) {
    assert_eq!(
        result.face_preserved(),
        result.face_similarity() >= 0.85,
        "method {}",
        result.method()
    );
}

#[test]
fn no_face_in_original_skips_identity_logic() {
    let h = harness(vec![Detection::NoFace]);
    let result = h.orchestrator.process(&request());

    assert_eq!(result.method().to_string(), "no_face_detected");
    assert!(!result.face_preserved());
    assert_eq!(result.face_similarity(), 0.0);
    assert_eq!(result.image(), &person());
    assert_eq!(h.analyzer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.swaps.load(Ordering::SeqCst), 0);
    assert_preserved_invariant(&result);
}

#[test]
fn close_match_is_accepted_without_restoration() {
    let h = harness(vec![original(), close_match()]);
    let result = h.orchestrator.process(&request());

    assert!((result.face_similarity() - 0.95).abs() < 1e-4);
    assert!(result.face_preserved());
    assert!(!result.method().contains(Stage::FaceSwap));
    assert_eq!(result.method().to_string(), "generator+enhanced");
    assert_eq!(h.swaps.load(Ordering::SeqCst), 0);
    assert_eq!(h.enhancements.load(Ordering::SeqCst), 1);
    assert_preserved_invariant(&result);
}

#[test]
fn weak_match_is_restored_but_not_enhanced() {
    let h = harness(vec![original(), weak_match(), weak_match()]);
    let result = h.orchestrator.process(&request());

    assert!((result.face_similarity() - 0.80).abs() < 1e-4);
    assert!(!result.face_preserved());
    let stages = result.method().stages();
    assert_eq!(
        &stages[..3],
        &[Stage::Generator, Stage::FaceSwap, Stage::ToneCorrected]
    );
    assert!(!result.method().contains(Stage::Enhanced));
    assert_eq!(h.swaps.load(Ordering::SeqCst), 1);
    assert_eq!(h.enhancements.load(Ordering::SeqCst), 0);
    assert_eq!(h.analyzer_calls.load(Ordering::SeqCst), 3);
    assert_preserved_invariant(&result);
}

#[test]
fn restoration_rescore_is_reported() {
    let h = harness(vec![
        original(),
        weak_match(),
        Detection::Face(vec![1.0, 0.05]),
    ]);
    let result = h.orchestrator.process(&request());

    assert!(result.face_similarity() > 0.99);
    assert!(result.face_preserved());
    assert!(result.method().contains(Stage::FaceSwap));
    assert_eq!(result.method().stages().last(), Some(&Stage::Enhanced));
    assert_eq!(h.enhancements.load(Ordering::SeqCst), 1);
    assert_preserved_invariant(&result);
}

#[test]
fn failed_rescore_keeps_prior_score() {
    let h = harness(vec![original(), weak_match(), Detection::Fail]);
    let result = h.orchestrator.process(&request());

    assert!((result.face_similarity() - 0.80).abs() < 1e-4);
    assert!(result.method().contains(Stage::RescoreFailed));
    assert!(result.method().is_degraded());
    assert_preserved_invariant(&result);
}

#[test]
fn generator_failure_returns_original_with_error() {
    let h = harness_with(
        vec![original()],
        Box::new(FailingGenerator),
        PreservationPolicy::default(),
    );
    let result = h.orchestrator.process(&request());

    assert!(result.is_error());
    assert_eq!(result.method().to_string(), "error+generation_failed");
    assert!(!result.face_preserved());
    assert_eq!(result.image(), &person());
    assert_preserved_invariant(&result);
}

#[test]
fn missing_face_in_output_is_inserted() {
    let h = harness(vec![original(), Detection::NoFace]);
    let result = h.orchestrator.process(&request());

    let stages = result.method().stages();
    assert_eq!(
        &stages[..3],
        &[Stage::Generator, Stage::NoFaceInOutput, Stage::FaceInserted]
    );
    assert!((result.face_similarity() - 0.95).abs() < 1e-6);
    assert!(result.face_preserved());
    assert_eq!(h.swaps.load(Ordering::SeqCst), 0);
    // inserted face centred at (120, 48)
    assert_eq!(result.image().get_pixel(120, 48).0, SKIN);
    assert_preserved_invariant(&result);
}

#[test]
fn analysis_failure_on_output_keeps_generated_image() {
    let h = harness(vec![original(), Detection::Fail]);
    let result = h.orchestrator.process(&request());

    assert_eq!(result.method().to_string(), "generator+face_analysis_failed");
    assert_eq!(result.face_similarity(), 0.0);
    assert_eq!(result.image(), &person());
    assert_preserved_invariant(&result);
}

#[test]
fn missing_swapper_is_recorded() {
    let (analyzer, _) = ScriptedAnalyzer::new(vec![original(), weak_match()]);
    let caps = Capabilities::new()
        .face_analyzer(Box::new(analyzer))
        .generator(Box::new(EchoGenerator));
    let orchestrator = PreservationOrchestrator::new(caps, PreservationPolicy::default()).unwrap();
    let result = orchestrator.process(&request());

    assert_eq!(result.method().to_string(), "generator+face_swap_unavailable");
    assert!((result.face_similarity() - 0.80).abs() < 1e-4);
    assert_eq!(result.image(), &person());
    assert_preserved_invariant(&result);
}

#[test]
fn missing_analyzer_still_generates() {
    let caps = Capabilities::new().generator(Box::new(EchoGenerator));
    let orchestrator = PreservationOrchestrator::new(caps, PreservationPolicy::default()).unwrap();
    let result = orchestrator.process(&request());

    assert_eq!(result.method().to_string(), "generator+face_analysis_unavailable");
    assert!(!result.face_preserved());
    assert_preserved_invariant(&result);
}

#[test]
fn preserve_face_off_runs_generator_only() {
    let h = harness(vec![original(), close_match()]);
    let result = h.orchestrator.process(&request().preserve_face(false));

    assert_eq!(result.method().to_string(), "generator");
    assert_eq!(result.face_similarity(), 0.0);
    assert_eq!(h.analyzer_calls.load(Ordering::SeqCst), 0);
    assert_preserved_invariant(&result);
}

#[test]
fn half_body_mode_crops_around_face() {
    let h = harness(vec![original(), original()]);
    let result = h
        .orchestrator
        .process(&request().display_mode(DisplayMode::HalfBody));

    // face y1 = 60, height 100: top 10, bottom 110 + 400 clamped to 320
    assert_eq!(result.image().dimensions(), (240, 310));
    assert_eq!(result.method().stages().last(), Some(&Stage::HalfBody));
    assert!((result.face_similarity() - 1.0).abs() < 1e-6);
    assert_preserved_invariant(&result);
}

#[test]
fn generated_output_is_resized_to_person() {
    let h = harness_with(
        vec![Detection::NoFace],
        Box::new(HalfSizeGenerator),
        PreservationPolicy::default(),
    );
    let result = h.orchestrator.process(&request());
    assert_eq!(result.image().dimensions(), (240, 320));
}

#[test]
fn large_inputs_are_downscaled_before_generation() {
    let caps = Capabilities::new().generator(Box::new(EchoGenerator));
    let orchestrator = PreservationOrchestrator::new(
        caps,
        PreservationPolicy::default().max_input_dimension(160),
    )
    .unwrap();
    let result = orchestrator.process(&request());
    assert_eq!(result.image().dimensions(), (120, 160));
}

#[test]
fn policy_from_toml_moves_the_restore_threshold() {
    let policy = PreservationPolicy::from_toml_str("restore_threshold = 0.75").unwrap();
    let h = harness_with(vec![original(), weak_match()], Box::new(EchoGenerator), policy);
    let result = h.orchestrator.process(&request());

    assert_eq!(result.method().to_string(), "generator");
    assert_eq!(h.swaps.load(Ordering::SeqCst), 0);
    assert!(!result.face_preserved());
    assert_preserved_invariant(&result);
}

#[test]
fn metadata_reports_method_trail() {
    let h = harness(vec![original(), close_match()]);
    let metadata = h.orchestrator.process(&request()).metadata();
    assert_eq!(metadata.method.to_string(), "generator+enhanced");
    assert!(metadata.face_preserved);
}

#[test]
fn concurrent_requests_share_serialized_capabilities() {
    let caps = Capabilities::new()
        .face_analyzer(Box::new(Serialized::new(SteadyAnalyzer)))
        .generator(Box::new(Serialized::new(EchoGenerator)));
    let orchestrator = PreservationOrchestrator::new(caps, PreservationPolicy::default()).unwrap();
    let request = request();

    let results: Vec<ProcessingResult> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| orchestrator.process(&request)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in &results {
        assert_eq!(result.method().to_string(), "generator");
        assert!((result.face_similarity() - 1.0).abs() < 1e-6);
        assert_preserved_invariant(result);
    }
}
