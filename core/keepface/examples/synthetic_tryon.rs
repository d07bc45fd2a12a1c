//! Run the full preservation pipeline on a synthetic portrait with toy models.
//!
//! Usage:
//!   cargo run --example synthetic_tryon [output.png]
//!
//! The generator tints the face to simulate identity drift; the swapper pastes
//! the original face back. Set `RUST_LOG=keepface=debug` for every transition.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use keepface::codec::encode_png;
use keepface::{
    Capabilities, Capability, CapabilityError, CompositeGenerator, DetectedFace, FaceAnalyzer,
    FaceBox, FaceHandle, FaceSwapper, GenerationParams, Landmark, PreservationOrchestrator,
    PreservationPolicy, TryOnGenerator, TryOnRequest,
};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

/// Treats warm, reddish pixels as face; the embedding is the mean colour.
struct WarmPatchAnalyzer;

impl FaceAnalyzer for WarmPatchAnalyzer {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
        let (mut x1, mut y1, mut x2, mut y2) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        let mut sum = [0.0f32; 3];
        let mut count = 0.0f32;
        for (x, y, p) in image.enumerate_pixels() {
            let [r, g, b] = p.0;
            if r > 120 && r > g && g > b {
                x1 = x1.min(x as i32);
                y1 = y1.min(y as i32);
                x2 = x2.max(x as i32 + 1);
                y2 = y2.max(y as i32 + 1);
                for (c, v) in [r, g, b].into_iter().enumerate() {
                    sum[c] += v as f32;
                }
                count += 1.0;
            }
        }
        let Some(bbox) = FaceBox::new(x1, y1, x2, y2) else {
            return Ok(vec![]);
        };
        Ok(vec![DetectedFace {
            bbox,
            landmarks: [Landmark::default(); 5],
            embedding: sum.iter().map(|s| s / count - 160.0).collect(),
            score: 0.9,
        }])
    }
}

/// Composites the garment, then cools the face down.
struct DriftingGenerator;

impl TryOnGenerator for DriftingGenerator {
    fn generate(
        &self,
        person: &RgbImage,
        garment: &RgbImage,
        params: &GenerationParams,
    ) -> Result<RgbImage, CapabilityError> {
        let mut out = CompositeGenerator.generate(person, garment, params)?;
        for p in out.pixels_mut() {
            let [r, g, b] = p.0;
            if r > 160 && g > 20 && r > g && g > b {
                *p = Rgb([r - 40, g - 10, b.saturating_add(10).min(g - 11)]);
            }
        }
        Ok(out)
    }
}

/// Pastes the source face crop over the target face box.
struct PasteSwapper;

impl FaceSwapper for PasteSwapper {
    fn swap(
        &self,
        target: FaceHandle<'_>,
        source: FaceHandle<'_>,
    ) -> Result<RgbImage, CapabilityError> {
        let (w, h) = target.image.dimensions();
        let (src, dst) = (
            source.face.bounding_box.clip(source.image.width(), source.image.height()),
            target.face.bounding_box.clip(w, h),
        );
        let (Some(src), Some(dst)) = (src, dst) else {
            return Err(CapabilityError::new(Capability::FaceSwap, "face outside image"));
        };
        let face = imageops::resize(
            &src.extract(source.image),
            dst.width,
            dst.height,
            FilterType::Lanczos3,
        );
        let mut out = target.image.clone();
        imageops::replace(&mut out, &face, dst.x as i64, dst.y as i64);
        Ok(out)
    }
}

fn portrait() -> RgbImage {
    RgbImage::from_fn(480, 640, |x, y| {
        let (dx, dy) = (x as f32 - 240.0, y as f32 - 100.0);
        if (dx / 45.0).powi(2) + (dy / 55.0).powi(2) <= 1.0 {
            Rgb([205, 160, 135])
        } else if y > 170 {
            Rgb([70, 70, 90])
        } else {
            Rgb([30, 110, 160])
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "synthetic_tryon.png".to_string());

    let caps = Capabilities::new()
        .face_analyzer(Box::new(WarmPatchAnalyzer))
        .generator(Box::new(DriftingGenerator))
        .face_swapper(Box::new(PasteSwapper));
    let orchestrator = PreservationOrchestrator::new(caps, PreservationPolicy::default())?;

    let garment = RgbImage::from_pixel(64, 64, Rgb([20, 140, 60]));
    let result = orchestrator.process(&TryOnRequest::new(portrait(), garment));

    println!("method:     {}", result.method());
    println!("similarity: {:.4}", result.face_similarity());
    println!("preserved:  {}", result.face_preserved());
    println!("elapsed:    {} ms", result.processing_time_ms());

    std::fs::write(&output, encode_png(result.image())?)?;
    println!("wrote {output}");
    Ok(())
}
