//! SIMD distance kernels built on the `wide` crate.
//!
//! Every kernel processes 8 lanes at a time with `f32x8` and finishes the
//! tail with scalar code. `wide` picks the best instruction set available
//! (SSE/AVX on x86, NEON on ARM) and falls back to scalar otherwise.

use wide::f32x8;

const SIMD_WIDTH: usize = 8;

#[inline]
fn lanes(slice: &[f32]) -> f32x8 {
    f32x8::new(slice.try_into().unwrap_or([0.0; SIMD_WIDTH]))
}

#[inline]
fn horizontal_sum(v: f32x8) -> f32 {
    v.to_array().iter().sum()
}

/// Squared Euclidean distance.
#[inline]
#[must_use]
pub fn euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");

    let simd_len = a.len() - (a.len() % SIMD_WIDTH);
    let mut sum = f32x8::ZERO;
    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        let diff = lanes(&a[i..i + SIMD_WIDTH]) - lanes(&b[i..i + SIMD_WIDTH]);
        sum += diff * diff;
    }

    let mut result = horizontal_sum(sum);
    for i in simd_len..a.len() {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

/// Dot product.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");

    let simd_len = a.len() - (a.len() % SIMD_WIDTH);
    let mut sum = f32x8::ZERO;
    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        sum += lanes(&a[i..i + SIMD_WIDTH]) * lanes(&b[i..i + SIMD_WIDTH]);
    }

    let mut result = horizontal_sum(sum);
    for i in simd_len..a.len() {
        result += a[i] * b[i];
    }
    result
}

/// Squared L2 norm.
#[inline]
#[must_use]
pub fn sum_of_squares(v: &[f32]) -> f32 {
    dot(v, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn test_kernels_match_scalar_across_tail_lengths() {
        for len in [1usize, 3, 8, 9, 17, 33] {
            let a: Vec<f32> = (0..len).map(|i| i as f32 * 0.5).collect();
            let b: Vec<f32> = (0..len).map(|i| 1.0 - i as f32 * 0.25).collect();

            let expected_dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
            assert!((dot(&a, &b) - expected_dot).abs() < 1e-3, "len {len}");
            assert!(
                (euclidean_squared(&a, &b) - scalar_euclidean_squared(&a, &b)).abs() < 1e-3,
                "len {len}"
            );
        }
    }

    #[test]
    fn test_sum_of_squares() {
        assert_eq!(sum_of_squares(&[3.0, 4.0]), 25.0);
        assert_eq!(sum_of_squares(&[]), 0.0);
    }
}
