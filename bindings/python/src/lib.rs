use image::RgbImage;
use keepface_core::blend::{blend_face, BlendMethod, FaceMask};
use keepface_core::codec::{decode_image, encode_jpeg, encode_png, DEFAULT_JPEG_QUALITY};
use keepface_core::crop::crop_half_body;
use keepface_core::{
    correct_skin_tone as correct_tone, similarity as scoring, FaceBox, KeepFaceError,
    PreservationPolicy, SkinTone, SkinToneExtractor,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};

fn to_py_err(e: KeepFaceError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_face_box(face: (i32, i32, i32, i32)) -> PyResult<FaceBox> {
    let (x1, y1, x2, y2) = face;
    FaceBox::new(x1, y1, x2, y2)
        .ok_or_else(|| PyValueError::new_err(format!("empty face box: {face:?}")))
}

fn encode(image: &RgbImage, format: &str) -> PyResult<Vec<u8>> {
    match format {
        "jpeg" => encode_jpeg(image, DEFAULT_JPEG_QUALITY).map_err(to_py_err),
        "png" => encode_png(image).map_err(to_py_err),
        _ => Err(PyValueError::new_err(format!("unknown format: {format}"))),
    }
}

fn image_dict<'py>(py: Python<'py>, image: &RgbImage, format: &str) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("data", PyBytes::new(py, &encode(image, format)?))?;
    dict.set_item("width", image.width())?;
    dict.set_item("height", image.height())?;
    Ok(dict)
}

/// Identity similarity of two face embeddings, in [0, 1].
#[pyfunction]
fn similarity(a: Vec<f32>, b: Vec<f32>) -> f32 {
    scoring::score(&a, &b)
}

/// Representative skin tone of an image (or a face crop) as an (r, g, b) tuple.
///
/// Args:
///     input: Raw image bytes (JPEG, PNG, or WebP)
///     face: Optional (x1, y1, x2, y2) box to measure instead of the whole image
#[pyfunction]
#[pyo3(signature = (input, *, face=None))]
fn skin_tone(input: Vec<u8>, face: Option<(i32, i32, i32, i32)>) -> PyResult<(u8, u8, u8)> {
    let image = decode_image(&input).map_err(to_py_err)?;
    let tones = SkinToneExtractor::default();
    let tone = match face {
        Some(face) => tones.tone_in(&image, &to_face_box(face)?),
        None => tones.tone(&image),
    };
    Ok((tone.r, tone.g, tone.b))
}

/// Crop from just above the face down to the waist, full width.
///
/// Returns:
///     dict with keys: data (bytes), width (int), height (int)
#[pyfunction]
#[pyo3(signature = (input, face, *, format="jpeg"))]
fn half_body_crop<'py>(
    py: Python<'py>,
    input: Vec<u8>,
    face: (i32, i32, i32, i32),
    format: &str,
) -> PyResult<Bound<'py, PyDict>> {
    let image = decode_image(&input).map_err(to_py_err)?;
    let cropped = crop_half_body(&image, &to_face_box(face)?);
    image_dict(py, &cropped, format)
}

/// Shift the face region's colour toward a target skin tone.
#[pyfunction]
#[pyo3(signature = (input, face, tone, *, damping=0.5, padding=0.1, format="png"))]
fn correct_skin_tone<'py>(
    py: Python<'py>,
    input: Vec<u8>,
    face: (i32, i32, i32, i32),
    tone: (u8, u8, u8),
    damping: f32,
    padding: f32,
    format: &str,
) -> PyResult<Bound<'py, PyDict>> {
    let image = decode_image(&input).map_err(to_py_err)?;
    let corrected = correct_tone(
        &image,
        &to_face_box(face)?,
        SkinTone::new(tone.0, tone.1, tone.2),
        damping,
        padding,
        &SkinToneExtractor::default(),
    )
    .ok_or_else(|| PyValueError::new_err("face lies outside the image"))?;
    image_dict(py, &corrected, format)
}

/// Blend the face of `foreground` into `background` through a feathered ellipse.
///
/// Returns:
///     dict with keys: data (bytes), width (int), height (int),
///                     method ("seamless", "alpha" or "alpha_fallback")
#[pyfunction]
#[pyo3(signature = (foreground, background, face, *, seamless=true, format="png"))]
fn blend<'py>(
    py: Python<'py>,
    foreground: Vec<u8>,
    background: Vec<u8>,
    face: (i32, i32, i32, i32),
    seamless: bool,
    format: &str,
) -> PyResult<Bound<'py, PyDict>> {
    let foreground = decode_image(&foreground).map_err(to_py_err)?;
    let background = decode_image(&background).map_err(to_py_err)?;
    let policy = PreservationPolicy::default();
    let mask = FaceMask::ellipse(
        &to_face_box(face)?,
        background.width(),
        background.height(),
        policy.blend_kernel,
        policy.blend_sigma,
    )
    .ok_or_else(|| PyValueError::new_err("face lies outside the image"))?;

    let (blended, method) = blend_face(&foreground, &background, &mask, seamless)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let dict = image_dict(py, &blended, format)?;
    let method = match method {
        BlendMethod::Seamless => "seamless",
        BlendMethod::Alpha => "alpha",
        BlendMethod::AlphaFallback => "alpha_fallback",
    };
    dict.set_item("method", method)?;
    Ok(dict)
}

/// The default preservation policy as TOML text.
#[pyfunction]
fn default_policy() -> PyResult<String> {
    PreservationPolicy::default()
        .to_toml_string()
        .map_err(to_py_err)
}

#[pymodule]
fn keepface(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(similarity, m)?)?;
    m.add_function(wrap_pyfunction!(skin_tone, m)?)?;
    m.add_function(wrap_pyfunction!(half_body_crop, m)?)?;
    m.add_function(wrap_pyfunction!(correct_skin_tone, m)?)?;
    m.add_function(wrap_pyfunction!(blend, m)?)?;
    m.add_function(wrap_pyfunction!(default_policy, m)?)?;
    Ok(())
}
