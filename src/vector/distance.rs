//! Distance metrics.
//!
//! Every metric returns a non-negative distance where smaller means closer,
//! so the query engine can rank all tables the same way.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::vector::simd;

/// Distance metric of a table. Fixed when the table is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `sqrt(sum((a - b)^2))`.
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`, in `[0, 2]`.
    Cosine,
    /// `max(0, 1 - a.b)`. Meaningful for normalized vectors.
    InnerProduct,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(VdbError::dimension_mismatch(a.len(), b.len()));
        }
        Ok(self.distance_unchecked(a, b))
    }

    /// Distance without the length check. Callers guarantee equal lengths.
    #[inline]
    pub(crate) fn distance_unchecked(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => simd::euclidean_squared(a, b).sqrt(),
            DistanceMetric::Cosine => {
                let norms = (simd::sum_of_squares(a) * simd::sum_of_squares(b)).sqrt();
                if norms == 0.0 {
                    return 1.0;
                }
                let cos = (simd::dot(a, b) / norms).clamp(-1.0, 1.0);
                (1.0 - cos).max(0.0)
            }
            DistanceMetric::InnerProduct => (1.0 - simd::dot(a, b)).max(0.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = VdbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            "inner_product" | "ip" | "dot" => Ok(DistanceMetric::InnerProduct),
            other => Err(VdbError::invalid_argument(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left alone.
pub fn normalize(v: &mut [f32]) {
    let norm = simd::sum_of_squares(v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Reject empty vectors and NaN / infinite components.
pub fn validate_components(v: &[f32]) -> Result<()> {
    if v.is_empty() {
        return Err(VdbError::invalid_argument("vector must not be empty"));
    }
    if let Some(pos) = v.iter().position(|x| !x.is_finite()) {
        return Err(VdbError::invalid_argument(format!(
            "vector component {pos} is not finite"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean() {
        let d = DistanceMetric::Euclidean
            .distance(&[1.0, 0.0, 0.0], &[0.9, 0.1, 0.0])
            .unwrap();
        assert!((d - 0.141_421_35).abs() < 1e-6);
        assert_eq!(
            DistanceMetric::Euclidean
                .distance(&[1.0, 2.0], &[1.0, 2.0])
                .unwrap(),
            0.0
        );
    }

    #[test]
    fn test_cosine() {
        let metric = DistanceMetric::Cosine;
        assert!(metric.distance(&[1.0, 0.0], &[2.0, 0.0]).unwrap() < 1e-6);
        assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!((metric.distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(metric.distance(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_inner_product_is_non_negative() {
        let metric = DistanceMetric::InnerProduct;
        assert_eq!(metric.distance(&[2.0, 0.0], &[2.0, 0.0]).unwrap(), 0.0);
        assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch() {
        let err = DistanceMetric::Euclidean
            .distance(&[1.0], &[1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, VdbError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!(
            "Cosine".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Cosine
        );
        assert_eq!(
            "l2".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Euclidean
        );
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_normalize_and_validate() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);

        assert!(validate_components(&[1.0, f32::NAN]).is_err());
        assert!(validate_components(&[]).is_err());
        assert!(validate_components(&[0.5]).is_ok());
    }
}
