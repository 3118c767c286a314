// src/transform.rs

use crate::dataset::FeatureMatrix;
use crate::error::{AnalysisError, Result};
use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standard deviations at or below this are treated as zero variance.
const ZERO_VARIANCE_THRESHOLD: f64 = 1e-12;
/// Standard deviations below this fraction of the median standard deviation
/// are flagged as near-constant.
const NEAR_ZERO_VARIANCE_RATIO: f64 = 1e-4;

/// Column means and standard deviations learned by `standardize`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaling {
    /// Shape: (n_features)
    pub mean: Array1<f64>,
    /// Sample standard deviations (n - 1 denominator), all strictly positive.
    /// Shape: (n_features)
    pub scale: Array1<f64>,
}

impl FeatureScaling {
    /// Applies the stored centering and scaling to another matrix with the same features.
    pub fn apply(&self, data: &FeatureMatrix) -> Result<FeatureMatrix> {
        if data.n_features() != self.mean.len() {
            return Err(AnalysisError::FeatureDimensionMismatch {
                left: data.n_features(),
                right: self.mean.len(),
            });
        }
        let mut values = data.values().to_owned();
        for mut row in values.axis_iter_mut(Axis(0)) {
            ndarray::Zip::from(&mut row)
                .and(&self.mean)
                .and(&self.scale)
                .for_each(|v, &m, &s| *v = (*v - m) / s);
        }
        data.with_values(values)
    }
}

/// Converts every column to z-scores: mean 0, sample standard deviation 1.
///
/// # Errors
/// `NonFinite` for NaN/infinite input, `InvalidParameter` for fewer than two
/// rows, `ZeroVariance` listing every constant column. Such columns must be
/// removed upstream (see `Corpus::drop_constant_features`).
pub fn standardize(data: &FeatureMatrix) -> Result<(FeatureMatrix, FeatureScaling)> {
    data.ensure_finite()?;
    let n_rows = data.n_rows();
    if n_rows < 2 {
        return Err(AnalysisError::InvalidParameter(format!(
            "standardization needs at least 2 rows, got {}",
            n_rows
        )));
    }
    if data.n_features() == 0 {
        return Err(AnalysisError::InvalidParameter("matrix has no features".to_owned()));
    }

    let values = data.values();
    let mean = values
        .mean_axis(Axis(0))
        .ok_or_else(|| AnalysisError::InvalidParameter("matrix has no rows".to_owned()))?;
    let mut centered = values - &mean;
    let scale = centered.std_axis(Axis(0), 1.0);

    let zero_variance: Vec<String> = scale
        .iter()
        .zip(data.feature_names())
        .filter(|(&s, _)| s <= ZERO_VARIANCE_THRESHOLD)
        .map(|(_, name)| name.clone())
        .collect();
    if !zero_variance.is_empty() {
        return Err(AnalysisError::ZeroVariance { features: zero_variance });
    }

    let mut sorted_scale = scale.to_vec();
    sorted_scale.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_scale = sorted_scale[sorted_scale.len() / 2];
    for (s, name) in scale.iter().zip(data.feature_names()) {
        if *s < median_scale * NEAR_ZERO_VARIANCE_RATIO {
            warn!(
                "Feature '{}' has near-zero variance (sd {:e}, median sd {:e}); its z-scores are unreliable.",
                name, s, median_scale
            );
        }
    }

    centered /= &scale;
    info!(
        "Standardized {} features over {} documents.",
        data.n_features(),
        n_rows
    );
    Ok((data.with_values(centered)?, FeatureScaling { mean, scale }))
}

/// `sign(x) * log_base(1 + |x|)`.
///
/// Odd, strictly increasing, and exactly 0 at 0.
pub fn signed_log(x: f64, base: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x.signum() * x.abs().ln_1p() / base.ln()
    }
}

/// Applies `signed_log` elementwise, compressing heavy-tailed z-scores.
///
/// # Errors
/// `InvalidParameter` unless `base` is finite and greater than 1.
pub fn signed_log_transform(data: &FeatureMatrix, base: f64) -> Result<FeatureMatrix> {
    if !base.is_finite() || base <= 1.0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "signed-log base must be finite and > 1, got {}",
            base
        )));
    }
    let transformed: Array2<f64> = data.values().mapv(|x| signed_log(x, base));
    data.with_values(transformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::Exp;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn matrix(values: Array2<f64>) -> FeatureMatrix {
        let ids = (0..values.nrows()).map(|i| format!("doc{}", i)).collect();
        let names = (0..values.ncols()).map(|j| format!("f{}", j)).collect();
        FeatureMatrix::new(ids, names, values).unwrap()
    }

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_sd() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let counts = Array2::random_using((200, 6), Exp::new(0.2).unwrap(), &mut rng);
        let (z, scaling) = standardize(&matrix(counts)).unwrap();

        for column in z.values().axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(column.std(1.0), 1.0, epsilon = 1e-10);
        }
        assert!(scaling.scale.iter().all(|&s| s > 0.0));
        assert_eq!(z.ids(), &(0..200).map(|i| format!("doc{}", i)).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn scaling_can_be_reapplied() {
        let data = matrix(array![[1.0, 10.0], [2.0, 20.0], [3.0, 40.0]]);
        let (z, scaling) = standardize(&data).unwrap();
        let again = scaling.apply(&data).unwrap();
        for (a, b) in z.values().iter().zip(again.values().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_variance_column_is_an_error() {
        let data = matrix(array![[1.0, 3.0], [2.0, 3.0], [5.0, 3.0]]);
        match standardize(&data) {
            Err(AnalysisError::ZeroVariance { features }) => assert_eq!(features, vec!["f1".to_owned()]),
            other => panic!("expected ZeroVariance, got {:?}", other),
        }
    }

    #[test]
    fn non_finite_input_is_an_error() {
        let data = matrix(array![[1.0, f64::INFINITY], [2.0, 3.0]]);
        assert!(matches!(standardize(&data), Err(AnalysisError::NonFinite { .. })));
    }

    #[test]
    fn signed_log_is_odd_monotone_and_fixes_zero() {
        for &base in &[2.0, std::f64::consts::E, 10.0] {
            assert_eq!(signed_log(0.0, base), 0.0);
            let mut previous = 0.0;
            for step in 1..200 {
                let x = step as f64 * 0.37;
                let y = signed_log(x, base);
                assert!(y > previous, "not increasing at x={}", x);
                assert_eq!(signed_log(-x, base), -y);
                previous = y;
            }
        }
        assert_abs_diff_eq!(signed_log(1.0, 2.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(signed_log(-9.0, 10.0), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn signed_log_transform_keeps_labels_and_rejects_bad_base() {
        let data = matrix(array![[0.0, -3.0], [1.0, 7.0]]);
        let out = signed_log_transform(&data, 2.0).unwrap();
        assert_eq!(out.ids(), data.ids());
        assert_eq!(out.values()[[0, 0]], 0.0);
        assert_abs_diff_eq!(out.values()[[0, 1]], -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.values()[[1, 1]], 3.0, epsilon = 1e-12);

        assert!(matches!(signed_log_transform(&data, 1.0), Err(AnalysisError::InvalidParameter(_))));
        assert!(matches!(signed_log_transform(&data, f64::NAN), Err(AnalysisError::InvalidParameter(_))));
    }

    #[test]
    fn near_constant_columns_are_still_standardized() {
        // Column 1 varies by 1e-7, far below 1e-4 of the median sd but above the zero floor.
        let data = matrix(array![
            [1.0, 1.0, 10.0],
            [2.0, 1.0 + 1e-7, 20.0],
            [3.0, 1.0, 30.0],
            [4.0, 1.0 + 1e-7, 40.0],
            [5.0, 1.0, 50.0]
        ]);
        let (z, scaling) = standardize(&data).unwrap();
        assert!(scaling.scale[1] > ZERO_VARIANCE_THRESHOLD);
        assert!(scaling.scale[1] < NEAR_ZERO_VARIANCE_RATIO * scaling.scale[0]);
        for column in z.values().axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(column.std(1.0), 1.0, epsilon = 1e-6);
        }
    }
}
