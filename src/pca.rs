// Principal component analysis (PCA)

use crate::dataset::FeatureMatrix;
use crate::error::{AnalysisError, Result};
use crate::linalg_backends::{sorted_descending, BackendEigh, LinAlgBackendProvider};
use crate::subspace::{canonical_sign, unit_length, ProvenanceStep, Subspace, SubspaceKind};
use log::{debug, info};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Eigenvalues at or below this fraction of the largest one are numerically
/// zero and never yield a component, tolerance or not.
pub const RANK_TOLERANCE: f64 = 1e-12;

/// Configuration for `fit_pca`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcaConfig {
    /// Number of components to keep. `None` keeps every component up to the
    /// rank bound `min(n_features, n_samples - 1)`.
    pub n_components: Option<usize>,
    /// Optional tolerance for excluding low-variance components
    /// (fraction of the largest eigenvalue, within `[0, 1]`). Components at or
    /// below `RANK_TOLERANCE` of the largest eigenvalue are always excluded.
    pub tolerance: Option<f64>,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: None,
            tolerance: None,
        }
    }
}

/// Fits an orthonormal PCA basis to `data` using an exact covariance/Gram matrix approach.
///
/// Data are mean-centered but not rescaled; standardize upstream if needed.
/// The eigen-decomposition runs on the covariance matrix when
/// n_features <= n_samples, and on the Gram matrix otherwise (the "Gram trick").
/// Components are ordered by descending eigenvalue, normalized to unit length and
/// signed so their largest-magnitude loading is positive.
///
/// # Errors
/// `NonFinite` for NaN/infinite input, `InvalidParameter` for fewer than two
/// samples, no features or a tolerance outside `[0, 1]`, `DimensionBound` if
/// more components are requested than `min(n_features, n_samples - 1)`,
/// `Decomposition` if LAPACK fails.
///
/// Rank-deficient data yield fewer components than requested: directions with
/// numerically zero variance are dropped rather than returned as arbitrary
/// vectors.
pub fn fit_pca(data: &FeatureMatrix, config: &PcaConfig) -> Result<Subspace> {
    data.ensure_finite()?;
    let n_samples = data.n_rows();
    let n_features = data.n_features();

    if n_samples < 2 || n_features == 0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "PCA needs at least 2 samples and 1 feature, got {}x{}",
            n_samples, n_features
        )));
    }

    if let Some(tol_val) = config.tolerance {
        if !tol_val.is_finite() || !(0.0..=1.0).contains(&tol_val) {
            return Err(AnalysisError::InvalidParameter(format!(
                "PCA tolerance must lie within [0, 1], got {}",
                tol_val
            )));
        }
    }

    let rank_bound = n_features.min(n_samples - 1);
    if let Some(requested) = config.n_components {
        if requested > rank_bound {
            return Err(AnalysisError::DimensionBound {
                method: "PCA",
                requested,
                bound: rank_bound,
            });
        }
    }

    let mean_vector = data
        .values()
        .mean_axis(Axis(0))
        .ok_or_else(|| AnalysisError::InvalidParameter("matrix has no rows".to_owned()))?;
    let centered = data.values() - &mean_vector;
    let backend = LinAlgBackendProvider::new();

    let (eigenvalues, axes) = if n_features <= n_samples {
        let mut cov_matrix = centered.t().dot(&centered);
        cov_matrix /= (n_samples - 1) as f64;

        let decomposition = backend.eigh_upper(&cov_matrix).map_err(|e| {
            AnalysisError::Decomposition(format!(
                "Eigen decomposition of covariance matrix failed: {}",
                e
            ))
        })?;
        sorted_descending(decomposition)
    } else {
        // Gram trick path
        let mut gram_matrix = centered.dot(&centered.t());
        gram_matrix /= (n_samples - 1) as f64;

        let decomposition = backend.eigh_upper(&gram_matrix).map_err(|e| {
            AnalysisError::Decomposition(format!(
                "Eigen decomposition of Gram matrix failed: {}",
                e
            ))
        })?;
        let (values, u_vecs) = sorted_descending(decomposition);
        // Eigenvalue from G = X'X'^T / (N-1)
        // V_k = X'^T u_k, re-normalized below.
        let axes = centered.t().dot(&u_vecs);
        (values, axes)
    };

    let largest_eigval = eigenvalues.get(0).copied().unwrap_or(0.0);
    let rank_limit = if largest_eigval <= 0.0 {
        0
    } else {
        let fraction = config.tolerance.unwrap_or(0.0).max(RANK_TOLERANCE);
        let threshold = largest_eigval * fraction;
        eigenvalues.iter().take_while(|&&val| val > threshold).count()
    };
    if rank_limit < rank_bound.min(config.n_components.unwrap_or(rank_bound)) {
        debug!(
            "PCA keeps {} of at most {} components; the rest carry negligible variance.",
            rank_limit, rank_bound
        );
    }
    let final_rank = config
        .n_components
        .unwrap_or(rank_bound)
        .min(rank_limit)
        .min(rank_bound);

    let mut rotation_matrix = Array2::<f64>::zeros((n_features, final_rank));
    for k in 0..final_rank {
        let axis = canonical_sign(unit_length(axes.column(k).to_owned()));
        rotation_matrix.slice_mut(s![.., k]).assign(&axis);
    }
    let explained_variance: Array1<f64> = eigenvalues
        .slice(s![..final_rank])
        .mapv(|v| v.max(0.0));

    debug!("PCA eigenvalues: {:?}", explained_variance);
    info!(
        "Fitted PCA with {} components on {} samples x {} features.",
        final_rank, n_samples, n_features
    );

    Ok(Subspace::from_parts(
        SubspaceKind::Pca,
        data.feature_names().to_vec(),
        rotation_matrix,
        Some(mean_vector),
        Some(explained_variance),
        ProvenanceStep::Fitted {
            kind: SubspaceKind::Pca,
            n_rows: n_samples,
            grouping: None,
        },
    ))
}

/// Fraction of total variance carried by each component of a PCA subspace,
/// given the total variance of the data it was fitted on.
pub fn explained_variance_ratio(subspace: &Subspace, data: &FeatureMatrix) -> Result<Array1<f64>> {
    let eigenvalues = subspace.eigenvalues().ok_or_else(|| {
        AnalysisError::InvalidParameter("subspace carries no eigenvalues".to_owned())
    })?;
    if data.n_rows() < 2 {
        return Err(AnalysisError::InvalidParameter(
            "variance needs at least 2 samples".to_owned(),
        ));
    }
    let total: f64 = data.values().var_axis(Axis(0), 1.0).sum();
    if total <= 0.0 {
        return Err(AnalysisError::ZeroVariance {
            features: data.feature_names().to_vec(),
        });
    }
    Ok(eigenvalues.mapv(|v| v / total))
}
