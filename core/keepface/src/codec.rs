use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};

use crate::error::KeepFaceError;

/// JPEG quality used for result images.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Encoded output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Baseline JPEG at [`DEFAULT_JPEG_QUALITY`].
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
}

impl OutputFormat {
    /// MIME type, as used in data URIs.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Decode PNG/JPEG/WebP bytes into RGB, compositing any alpha onto white.
pub fn decode_image(input: &[u8]) -> Result<RgbImage, KeepFaceError> {
    let decoded =
        image::load_from_memory(input).map_err(|e| KeepFaceError::DecodeError(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(KeepFaceError::ZeroDimensions);
    }
    Ok(flatten_alpha(&decoded))
}

/// Decode a base64 image, with or without a `data:image/...;base64,` prefix.
pub fn decode_base64_image(input: &str) -> Result<RgbImage, KeepFaceError> {
    let payload = strip_data_uri(input.trim());
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| KeepFaceError::DecodeError(format!("invalid base64: {e}")))?;
    decode_image(&bytes)
}

fn strip_data_uri(input: &str) -> &str {
    if !input.starts_with("data:") {
        return input;
    }
    match input.find(',') {
        Some(comma) => &input[comma + 1..],
        None => input,
    }
}

/// Flatten alpha channel by compositing onto a white background.
pub(crate) fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([over_white(r), over_white(g), over_white(b)]));
    }
    rgb
}

/// Encode as JPEG at `quality` (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, KeepFaceError> {
    check_dimensions(image)?;
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| KeepFaceError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

/// Encode as lossless PNG.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, KeepFaceError> {
    check_dimensions(image)?;
    let mut buffer = Cursor::new(Vec::new());
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| KeepFaceError::EncodeError(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Encode to `format` and wrap as base64, optionally as a data URI.
pub fn encode_base64(
    image: &RgbImage,
    format: OutputFormat,
    data_uri: bool,
) -> Result<String, KeepFaceError> {
    let bytes = match format {
        OutputFormat::Jpeg => encode_jpeg(image, DEFAULT_JPEG_QUALITY)?,
        OutputFormat::Png => encode_png(image)?,
    };
    let encoded = STANDARD.encode(bytes);
    if data_uri {
        Ok(format!("data:{};base64,{encoded}", format.mime_type()))
    } else {
        Ok(encoded)
    }
}

/// Shrink `image` so neither side exceeds `max_dimension`, keeping aspect.
/// Images already within bounds are returned unchanged.
pub fn downscale_to_fit(image: RgbImage, max_dimension: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    if max_dimension == 0 || (src_w <= max_dimension && src_h <= max_dimension) {
        return image;
    }

    let (new_w, new_h) = if src_w >= src_h {
        let h = ((src_h as f64 / src_w as f64) * max_dimension as f64).round() as u32;
        (max_dimension, h.max(1))
    } else {
        let w = ((src_w as f64 / src_h as f64) * max_dimension as f64).round() as u32;
        (w.max(1), max_dimension)
    };

    image::imageops::resize(&image, new_w, new_h, FilterType::Lanczos3)
}

fn check_dimensions(image: &RgbImage) -> Result<(), KeepFaceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(KeepFaceError::ZeroDimensions);
    }
    Ok(())
}
