use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::codec::decode_base64_image;
use crate::error::KeepFaceError;

/// Default denoising steps handed to the generator.
pub const DEFAULT_NUM_STEPS: u32 = 20;

/// Default classifier-free guidance scale handed to the generator.
pub const DEFAULT_GUIDANCE_SCALE: f32 = 2.0;

/// Which part of the body the garment covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentCategory {
    /// Tops, shirts, jackets.
    #[default]
    Upperbody,
    /// Trousers, skirts.
    Lowerbody,
    /// Full-body garments.
    Dress,
}

impl GarmentCategory {
    /// Lowercase name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            GarmentCategory::Upperbody => "upperbody",
            GarmentCategory::Lowerbody => "lowerbody",
            GarmentCategory::Dress => "dress",
        }
    }
}

impl fmt::Display for GarmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GarmentCategory {
    type Err = KeepFaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upperbody" => Ok(GarmentCategory::Upperbody),
            "lowerbody" => Ok(GarmentCategory::Lowerbody),
            "dress" => Ok(GarmentCategory::Dress),
            other => Err(KeepFaceError::InvalidRequest(format!(
                "unknown garment category: {other}"
            ))),
        }
    }
}

/// How the final image is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// The whole generated image.
    #[default]
    Full,
    /// Cropped from just above the head to the waist.
    HalfBody,
}

impl FromStr for DisplayMode {
    type Err = KeepFaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(DisplayMode::Full),
            "half_body" | "half-body" => Ok(DisplayMode::HalfBody),
            other => Err(KeepFaceError::InvalidRequest(format!(
                "unknown display mode: {other}"
            ))),
        }
    }
}

/// Knobs forwarded untouched to the try-on generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Garment category.
    pub category: GarmentCategory,
    /// Denoising steps.
    pub num_steps: u32,
    /// Guidance scale.
    pub guidance_scale: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            category: GarmentCategory::default(),
            num_steps: DEFAULT_NUM_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
        }
    }
}

/// One try-on request: a person photo, a garment photo and their options.
///
/// ```
/// use image::RgbImage;
/// use keepface::{DisplayMode, GarmentCategory, TryOnRequest};
///
/// let request = TryOnRequest::new(RgbImage::new(64, 96), RgbImage::new(32, 32))
///     .category(GarmentCategory::Dress)
///     .display_mode(DisplayMode::HalfBody);
/// assert!(request.preserves_face());
/// ```
#[derive(Debug, Clone)]
pub struct TryOnRequest {
    person: RgbImage,
    garment: RgbImage,
    params: GenerationParams,
    preserve_face: bool,
    display_mode: DisplayMode,
}

impl TryOnRequest {
    /// A request with default options: upper body, face preserved, full framing.
    pub fn new(person: RgbImage, garment: RgbImage) -> Self {
        Self {
            person,
            garment,
            params: GenerationParams::default(),
            preserve_face: true,
            display_mode: DisplayMode::default(),
        }
    }

    /// Build a request from two base64 images (data URIs accepted).
    pub fn from_base64(person: &str, garment: &str) -> Result<Self, KeepFaceError> {
        Ok(Self::new(
            decode_base64_image(person)?,
            decode_base64_image(garment)?,
        ))
    }

    /// Set the garment category (default: upperbody).
    pub fn category(mut self, category: GarmentCategory) -> Self {
        self.params.category = category;
        self
    }

    /// Set the generator's denoising steps (default: 20).
    pub fn num_steps(mut self, steps: u32) -> Self {
        self.params.num_steps = steps;
        self
    }

    /// Set the generator's guidance scale (default: 2.0).
    pub fn guidance_scale(mut self, scale: f32) -> Self {
        self.params.guidance_scale = scale;
        self
    }

    /// Enable or disable identity preservation (default: true).
    pub fn preserve_face(mut self, enable: bool) -> Self {
        self.preserve_face = enable;
        self
    }

    /// Set the output framing (default: full).
    pub fn display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    /// The person photo.
    pub fn person(&self) -> &RgbImage {
        &self.person
    }

    /// The garment photo.
    pub fn garment(&self) -> &RgbImage {
        &self.garment
    }

    /// Options forwarded to the generator.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Whether identity preservation runs.
    pub fn preserves_face(&self) -> bool {
        self.preserve_face
    }

    /// Requested output framing.
    pub fn mode(&self) -> DisplayMode {
        self.display_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_base64, OutputFormat};

    #[test]
    fn categories_parse_case_insensitively() {
        assert_eq!("upperbody".parse::<GarmentCategory>().unwrap(), GarmentCategory::Upperbody);
        assert_eq!("LowerBody".parse::<GarmentCategory>().unwrap(), GarmentCategory::Lowerbody);
        assert_eq!(" dress ".parse::<GarmentCategory>().unwrap(), GarmentCategory::Dress);
        assert!(matches!(
            "hat".parse::<GarmentCategory>(),
            Err(KeepFaceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn display_modes_parse() {
        assert_eq!("full".parse::<DisplayMode>().unwrap(), DisplayMode::Full);
        assert_eq!("half_body".parse::<DisplayMode>().unwrap(), DisplayMode::HalfBody);
        assert!("portrait".parse::<DisplayMode>().is_err());
    }

    #[test]
    fn defaults() {
        let request = TryOnRequest::new(RgbImage::new(4, 4), RgbImage::new(2, 2));
        assert_eq!(request.params(), &GenerationParams::default());
        assert_eq!(request.params().num_steps, 20);
        assert_eq!(request.params().guidance_scale, 2.0);
        assert!(request.preserves_face());
        assert_eq!(request.mode(), DisplayMode::Full);
    }

    #[test]
    fn builder_overrides() {
        let request = TryOnRequest::new(RgbImage::new(4, 4), RgbImage::new(2, 2))
            .category(GarmentCategory::Lowerbody)
            .num_steps(30)
            .guidance_scale(1.5)
            .preserve_face(false);
        assert_eq!(request.params().category, GarmentCategory::Lowerbody);
        assert_eq!(request.params().num_steps, 30);
        assert_eq!(request.params().guidance_scale, 1.5);
        assert!(!request.preserves_face());
    }

    #[test]
    fn from_base64_decodes_both_images() {
        let person = RgbImage::from_pixel(6, 9, image::Rgb([1, 2, 3]));
        let garment = RgbImage::from_pixel(5, 5, image::Rgb([4, 5, 6]));
        let request = TryOnRequest::from_base64(
            &encode_base64(&person, OutputFormat::Png, true).unwrap(),
            &encode_base64(&garment, OutputFormat::Png, false).unwrap(),
        )
        .unwrap();
        assert_eq!(request.person(), &person);
        assert_eq!(request.garment(), &garment);
    }
}
