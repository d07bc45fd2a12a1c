//! Identity similarity between face embeddings.
//!
//! Scores are cosine similarity remapped from `[-1, 1]` to `[0, 1]`, so `1.0`
//! means identical direction and `0.5` means orthogonal.

use crate::descriptor::FaceDescriptor;

/// Similarity of two embeddings in `[0, 1]`.
///
/// Returns `0.0` when either embedding is empty, zero, non-finite, or when
/// their lengths differ: there is no identity signal to compare.
pub fn score(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (Some(norm_a), Some(norm_b)) = (l2_norm(a), l2_norm(b)) else {
        return 0.0;
    };

    let cosine: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64 / norm_a) * (*y as f64 / norm_b))
        .sum();

    if !cosine.is_finite() {
        return 0.0;
    }

    (((cosine + 1.0) / 2.0) as f32).clamp(0.0, 1.0)
}

/// Similarity of two optional descriptors; `0.0` if either is absent.
pub fn score_descriptors(a: Option<&FaceDescriptor>, b: Option<&FaceDescriptor>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => score(&a.embedding, &b.embedding),
        _ => 0.0,
    }
}

fn l2_norm(v: &[f32]) -> Option<f64> {
    let norm = v
        .iter()
        .map(|x| {
            let x = *x as f64;
            x * x
        })
        .sum::<f64>()
        .sqrt();
    (norm.is_finite() && norm > 0.0).then_some(norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(seed: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| ((i as f32 + seed as f32) * 0.37).sin() * (1.0 + seed as f32))
            .collect()
    }

    #[test]
    fn reflexive() {
        for seed in 0..8 {
            let e = embedding(seed, 512);
            assert!((score(&e, &e) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn commutative() {
        let a = embedding(1, 512);
        let b = embedding(5, 512);
        assert_eq!(score(&a, &b), score(&b, &a));
    }

    #[test]
    fn scale_invariant() {
        let a = embedding(2, 64);
        let scaled: Vec<f32> = a.iter().map(|x| x * 1000.0).collect();
        assert!((score(&a, &scaled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_and_orthogonal() {
        assert!(score(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-6);
        assert!((score(&[1.0, 0.0], &[0.0, 3.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn remaps_cosine_into_unit_interval() {
        // cos = 0.6 → 0.8
        assert!((score(&[1.0, 0.0], &[0.6, 0.8]) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn adversarial_inputs_stay_in_range() {
        let cases: Vec<(Vec<f32>, Vec<f32>)> = vec![
            (vec![0.0; 8], vec![0.0; 8]),
            (vec![0.0; 8], embedding(3, 8)),
            (vec![f32::MAX; 4], vec![f32::MAX; 4]),
            (vec![f32::MAX; 4], vec![-f32::MAX; 4]),
            (vec![f32::MIN_POSITIVE; 4], vec![f32::MIN_POSITIVE; 4]),
            (vec![f32::NAN, 1.0], vec![1.0, 1.0]),
            (vec![f32::INFINITY, 1.0], vec![1.0, 1.0]),
            (vec![1.0, 2.0, 3.0], vec![1.0, 2.0]),
            (vec![], vec![]),
        ];
        for (a, b) in &cases {
            let s = score(a, b);
            assert!((0.0..=1.0).contains(&s), "{a:?} vs {b:?} -> {s}");
        }
    }

    #[test]
    fn absent_inputs_score_zero() {
        assert_eq!(score(&[], &[]), 0.0);
        assert_eq!(score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(score_descriptors(None, None), 0.0);
    }
}
