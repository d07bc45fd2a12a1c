use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, warn};

use crate::blend::{blend_face, BlendMethod, FaceMask};
use crate::descriptor::FaceDescriptor;
use crate::face_analyzer::FaceBox;
use crate::policy::PreservationPolicy;

/// A face pasted into an image that had none.
#[derive(Debug, Clone)]
pub struct Insertion {
    /// Target image with the face blended in.
    pub image: RgbImage,
    /// Where the face was placed.
    pub face_box: FaceBox,
    /// How the face was blended.
    pub method: BlendMethod,
}

/// Paste the source face into `target` at an estimated head position.
///
/// The face crop is scaled to `insert_width_ratio` of the target width,
/// aspect kept, centred horizontally with its centre at `insert_head_y` of
/// the target height, clamped inside the image, then blended through the
/// same feathered ellipse used for restoration. `None` when the source face
/// lies outside its image or the blend fails.
pub fn insert_face(
    source_image: &RgbImage,
    source_face: &FaceDescriptor,
    target: &RgbImage,
    policy: &PreservationPolicy,
) -> Option<Insertion> {
    let (target_w, target_h) = target.dimensions();
    if target_w == 0 || target_h == 0 {
        return None;
    }

    let crop = source_face
        .bounding_box
        .clip(source_image.width(), source_image.height())?;
    let face = crop.extract(source_image);

    let (new_w, new_h) = placed_size(crop.width, crop.height, target_w, target_h, policy);
    let resized = imageops::resize(&face, new_w, new_h, FilterType::Lanczos3);

    let center_x = target_w as f32 / 2.0;
    let center_y = target_h as f32 * policy.insert_head_y;
    let x = (center_x - new_w as f32 / 2.0)
        .round()
        .clamp(0.0, (target_w - new_w) as f32) as i32;
    let y = (center_y - new_h as f32 / 2.0)
        .round()
        .clamp(0.0, (target_h - new_h) as f32) as i32;
    let face_box = FaceBox::from_xywh(x, y, new_w as i32, new_h as i32)?;

    debug!(x, y, width = new_w, height = new_h, "inserting face");

    let mut pasted = target.clone();
    imageops::replace(&mut pasted, &resized, x as i64, y as i64);

    let mask = FaceMask::ellipse(
        &face_box,
        target_w,
        target_h,
        policy.blend_kernel,
        policy.blend_sigma,
    )?;
    match blend_face(&pasted, target, &mask, policy.seamless_blend) {
        Ok((image, method)) => Some(Insertion {
            image,
            face_box,
            method,
        }),
        Err(err) => {
            warn!(error = %err, "face insertion blend failed");
            None
        }
    }
}

/// Scaled face size: `insert_width_ratio` of the target width, source
/// aspect kept, shrunk further if it would not fit the target height.
fn placed_size(
    crop_w: u32,
    crop_h: u32,
    target_w: u32,
    target_h: u32,
    policy: &PreservationPolicy,
) -> (u32, u32) {
    let aspect = crop_h as f32 / crop_w as f32;
    let mut width = (target_w as f32 * policy.insert_width_ratio).round().max(1.0);
    let mut height = (width * aspect).round().max(1.0);
    if height > target_h as f32 {
        height = target_h as f32;
        width = (height / aspect).round().max(1.0);
    }
    (
        (width as u32).min(target_w),
        (height as u32).min(target_h),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::SkinTone;
    use crate::face_analyzer::Landmark;
    use image::Rgb;

    fn source() -> (RgbImage, FaceDescriptor) {
        let mut image = RgbImage::from_pixel(200, 200, Rgb([30, 30, 30]));
        for y in 40..140 {
            for x in 60..140 {
                image.put_pixel(x, y, Rgb([210, 160, 140]));
            }
        }
        let face = FaceDescriptor {
            bounding_box: FaceBox::new(60, 40, 140, 140).unwrap(),
            landmarks: [Landmark::default(); 5],
            embedding: vec![0.3, 0.7],
            detection_score: 0.9,
            skin_tone: SkinTone::new(210, 160, 140),
        };
        (image, face)
    }

    #[test]
    fn placed_at_head_position_with_quarter_width() {
        let (image, face) = source();
        let target = RgbImage::from_pixel(400, 600, Rgb([0, 90, 0]));
        let insertion = insert_face(&image, &face, &target, &PreservationPolicy::default()).unwrap();

        // 25% of 400 wide, 80x100 aspect kept
        assert_eq!(insertion.face_box.width(), 100);
        assert_eq!(insertion.face_box.height(), 125);
        let (cx, cy) = insertion.face_box.center();
        assert!((cx - 200.0).abs() <= 1.0);
        assert!((cy - 90.0).abs() <= 1.0);

        assert_eq!(insertion.image.get_pixel(200, 90).0, [210, 160, 140]);
        assert_eq!(insertion.image.get_pixel(200, 500), target.get_pixel(200, 500));
        assert_eq!(insertion.image.dimensions(), target.dimensions());
    }

    #[test]
    fn clamped_inside_small_targets() {
        let (image, face) = source();
        let target = RgbImage::from_pixel(120, 60, Rgb([0, 90, 0]));
        let insertion = insert_face(&image, &face, &target, &PreservationPolicy::default()).unwrap();
        assert!(insertion.face_box.x1 >= 0 && insertion.face_box.y1 >= 0);
        assert!(insertion.face_box.x2 <= 120 && insertion.face_box.y2 <= 60);
        // touches the top border, so the seamless clone cannot run
        assert_eq!(insertion.method, BlendMethod::AlphaFallback);
    }

    #[test]
    fn tall_faces_shrink_to_fit() {
        let policy = PreservationPolicy::default().insert_width_ratio(1.0);
        assert_eq!(placed_size(50, 200, 100, 100, &policy), (25, 100));
    }

    #[test]
    fn source_face_outside_image_is_not_inserted() {
        let (image, mut face) = source();
        face.bounding_box = FaceBox::new(300, 300, 380, 380).unwrap();
        let target = RgbImage::new(100, 100);
        assert!(insert_face(&image, &face, &target, &PreservationPolicy::default()).is_none());
    }
}
