//! Face compositing: feathered elliptical masks, alpha blending and a
//! gradient-domain seamless clone.
//!
//! The seamless clone solves the Poisson equation only across the feathered
//! transition band of the mask. Inside the band's inner edge the pasted face
//! is kept verbatim, outside its outer edge the background is kept, and in
//! between the result keeps the face's gradients while meeting both edges
//! without a seam.

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::drawing::draw_filled_ellipse_mut;
use imageproc::filter::separable_filter_equal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::face_analyzer::FaceBox;

/// Alpha at or above which a mask pixel belongs to the pasted face.
const INNER_ALPHA: u8 = 250;

/// Alpha at or below which a mask pixel belongs to the background.
const OUTER_ALPHA: u8 = 5;

const SOR_OMEGA: f32 = 1.8;
const MAX_ITERATIONS: usize = 2000;
const TOLERANCE: f32 = 0.01;

/// Why a blend could not be performed.
#[derive(Debug, Error, PartialEq)]
pub enum BlendError {
    /// The two images must have identical dimensions.
    #[error("foreground {foreground:?} and background {background:?} differ in size")]
    SizeMismatch {
        /// Foreground dimensions.
        foreground: (u32, u32),
        /// Background dimensions.
        background: (u32, u32),
    },

    /// No pixel of the mask reaches the inner alpha threshold.
    #[error("mask has no fully opaque pixels")]
    EmptyMask,

    /// The mask is a hard edge with nothing to solve across.
    #[error("mask has no transition band")]
    EmptyTransition,

    /// The band needs a neighbour outside the window or the image.
    #[error("transition band touches the image border")]
    OutOfBounds,

    /// The solver hit its sweep limit.
    #[error("poisson solver did not converge after {0} iterations")]
    NotConverged(usize),
}

/// Feathered elliptical mask covering a window of the full image.
#[derive(Debug, Clone)]
pub struct FaceMask {
    /// Window origin in image coordinates.
    pub x: u32,
    /// See [`FaceMask::x`].
    pub y: u32,
    /// Per-pixel opacity within the window.
    pub alpha: GrayImage,
    image_size: (u32, u32),
}

impl FaceMask {
    /// Ellipse inscribed in `face`, edges softened with a `kernel`-tap
    /// gaussian of the given `sigma`. `None` if the face misses the image.
    pub fn ellipse(
        face: &FaceBox,
        image_width: u32,
        image_height: u32,
        kernel: u32,
        sigma: f32,
    ) -> Option<Self> {
        let window = face
            .expanded(kernel as i32)
            .clip(image_width, image_height)?;
        face.clip(image_width, image_height)?;

        // Coverage is drawn and blurred in f32 so the opaque core stays at 255.
        let mut coverage: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::new(window.width, window.height);
        let (cx, cy) = face.center();
        let center = (
            cx.round() as i32 - window.x as i32,
            cy.round() as i32 - window.y as i32,
        );
        let radius_x = (face.width() / 2).max(1);
        let radius_y = (face.height() / 2).max(1);
        draw_filled_ellipse_mut(&mut coverage, center, radius_x, radius_y, Luma([255.0f32]));

        if kernel > 1 {
            coverage = separable_filter_equal(&coverage, &gaussian_kernel(kernel, sigma));
        }
        let alpha = GrayImage::from_fn(window.width, window.height, |x, y| {
            Luma([coverage.get_pixel(x, y).0[0].round().clamp(0.0, 255.0) as u8])
        });

        Some(Self {
            x: window.x,
            y: window.y,
            alpha,
            image_size: (image_width, image_height),
        })
    }

    /// Opacity at image coordinate `(x, y)` in `[0, 1]`; zero outside the window.
    pub fn opacity(&self, x: u32, y: u32) -> f32 {
        if x < self.x || y < self.y {
            return 0.0;
        }
        let (lx, ly) = (x - self.x, y - self.y);
        if lx >= self.alpha.width() || ly >= self.alpha.height() {
            return 0.0;
        }
        self.alpha.get_pixel(lx, ly).0[0] as f32 / 255.0
    }

    fn touches_image_border(&self, lx: u32, ly: u32) -> bool {
        let (x, y) = (self.x + lx, self.y + ly);
        x == 0 || y == 0 || x + 1 >= self.image_size.0 || y + 1 >= self.image_size.1
    }
}

/// Normalized 1-D gaussian with `size` taps (rounded up to odd).
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size | 1;
    let half = (size / 2) as i32;
    let sigma = sigma.max(f32::EPSILON);
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

fn check_sizes(foreground: &RgbImage, background: &RgbImage) -> Result<(), BlendError> {
    if foreground.dimensions() != background.dimensions() {
        return Err(BlendError::SizeMismatch {
            foreground: foreground.dimensions(),
            background: background.dimensions(),
        });
    }
    Ok(())
}

/// Linear blend of `foreground` over `background` weighted by `mask`.
pub fn alpha_composite(
    foreground: &RgbImage,
    background: &RgbImage,
    mask: &FaceMask,
) -> Result<RgbImage, BlendError> {
    check_sizes(foreground, background)?;

    let mut result = background.clone();
    for (lx, ly, a) in mask.alpha.enumerate_pixels() {
        let alpha = a.0[0] as f32 / 255.0;
        if alpha <= 0.0 {
            continue;
        }
        let (x, y) = (mask.x + lx, mask.y + ly);
        let fg = foreground.get_pixel(x, y).0;
        let bg = result.get_pixel_mut(x, y);
        for c in 0..3 {
            bg.0[c] = (fg[c] as f32 * alpha + bg.0[c] as f32 * (1.0 - alpha))
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    }
    Ok(result)
}

#[derive(Clone, Copy, PartialEq)]
enum Zone {
    Inner,
    Band,
    Outer,
}

/// Gradient-domain clone of `foreground` into `background` across the
/// transition band of `mask`.
pub fn seamless_clone(
    foreground: &RgbImage,
    background: &RgbImage,
    mask: &FaceMask,
) -> Result<RgbImage, BlendError> {
    check_sizes(foreground, background)?;

    let (w, h) = mask.alpha.dimensions();
    let index = |x: u32, y: u32| (y * w + x) as usize;

    let mut zones = Vec::with_capacity((w * h) as usize);
    let mut band = Vec::new();
    let mut has_inner = false;
    for (lx, ly, a) in mask.alpha.enumerate_pixels() {
        let zone = match a.0[0] {
            v if v >= INNER_ALPHA => Zone::Inner,
            v if v <= OUTER_ALPHA => Zone::Outer,
            _ => Zone::Band,
        };
        match zone {
            Zone::Inner => has_inner = true,
            Zone::Band => {
                if lx == 0 || ly == 0 || lx + 1 >= w || ly + 1 >= h {
                    return Err(BlendError::OutOfBounds);
                }
                if mask.touches_image_border(lx, ly) {
                    return Err(BlendError::OutOfBounds);
                }
                band.push((lx, ly));
            }
            Zone::Outer => {}
        }
        zones.push(zone);
    }
    if !has_inner {
        return Err(BlendError::EmptyMask);
    }
    if band.is_empty() {
        return Err(BlendError::EmptyTransition);
    }

    // Offset field d: result = foreground + d. Zero on the inner edge,
    // background - foreground on the outer edge, harmonic in the band.
    let mut offset = vec![[0.0f32; 3]; (w * h) as usize];
    for ly in 0..h {
        for lx in 0..w {
            let zone = zones[index(lx, ly)];
            if zone == Zone::Inner {
                continue;
            }
            let fg = foreground.get_pixel(mask.x + lx, mask.y + ly).0;
            let bg = background.get_pixel(mask.x + lx, mask.y + ly).0;
            let alpha = mask.alpha.get_pixel(lx, ly).0[0] as f32 / 255.0;
            let weight = if zone == Zone::Outer { 1.0 } else { 1.0 - alpha };
            for c in 0..3 {
                offset[index(lx, ly)][c] = (bg[c] as f32 - fg[c] as f32) * weight;
            }
        }
    }

    let mut converged_after = None;
    for iteration in 0..MAX_ITERATIONS {
        let mut max_change = 0.0f32;
        for &(lx, ly) in &band {
            let neighbours = [
                index(lx - 1, ly),
                index(lx + 1, ly),
                index(lx, ly - 1),
                index(lx, ly + 1),
            ];
            let i = index(lx, ly);
            for c in 0..3 {
                let mean = neighbours.iter().map(|&n| offset[n][c]).sum::<f32>() / 4.0;
                let updated = offset[i][c] + SOR_OMEGA * (mean - offset[i][c]);
                max_change = max_change.max((updated - offset[i][c]).abs());
                offset[i][c] = updated;
            }
        }
        if max_change < TOLERANCE {
            converged_after = Some(iteration + 1);
            break;
        }
    }
    let Some(iterations) = converged_after else {
        return Err(BlendError::NotConverged(MAX_ITERATIONS));
    };
    debug!(band = band.len(), iterations, "seamless clone converged");

    let mut result = background.clone();
    for ly in 0..h {
        for lx in 0..w {
            let (x, y) = (mask.x + lx, mask.y + ly);
            let fg = foreground.get_pixel(x, y).0;
            let out = result.get_pixel_mut(x, y);
            match zones[index(lx, ly)] {
                Zone::Outer => {}
                Zone::Inner => out.0 = fg,
                Zone::Band => {
                    let d = offset[index(lx, ly)];
                    for c in 0..3 {
                        out.0[c] = (fg[c] as f32 + d[c]).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
    }
    Ok(result)
}

/// How a blend was actually performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMethod {
    /// Gradient-domain clone across the mask's band.
    Seamless,
    /// Alpha compositing because seamless was disabled.
    Alpha,
    /// Alpha compositing after the seamless clone failed.
    AlphaFallback,
}

/// Composite `foreground` over `background` through `mask`, trying the
/// seamless clone first when `seamless` is set.
pub fn blend_face(
    foreground: &RgbImage,
    background: &RgbImage,
    mask: &FaceMask,
    seamless: bool,
) -> Result<(RgbImage, BlendMethod), BlendError> {
    if seamless {
        match seamless_clone(foreground, background, mask) {
            Ok(image) => return Ok((image, BlendMethod::Seamless)),
            Err(err @ BlendError::SizeMismatch { .. }) => return Err(err),
            Err(err) => {
                warn!(error = %err, "seamless clone failed, falling back to alpha blend");
                return alpha_composite(foreground, background, mask)
                    .map(|image| (image, BlendMethod::AlphaFallback));
            }
        }
    }
    alpha_composite(foreground, background, mask).map(|image| (image, BlendMethod::Alpha))
}
