// src/similarity.rs

use crate::error::{AnalysisError, Result};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};
use crate::subspace::{orthonormal_span, Subspace};
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Overlap between the spans of two subspaces, summarized by the cosines of
/// their principal angles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubspaceSimilarity {
    /// Descending, each in [0, 1]. Length: min(n_dims_a, n_dims_b)
    pub cosines: Array1<f64>,
}

impl SubspaceSimilarity {
    /// Sum of the cosines: the number of dimensions the two spans effectively share.
    pub fn shared_dimensions(&self) -> f64 {
        self.cosines.sum()
    }

    /// Mean squared cosine. For orthonormal bases this is the average variance
    /// of one space's axes explained by the other space.
    pub fn expected_r_squared(&self) -> f64 {
        if self.cosines.is_empty() {
            return 0.0;
        }
        self.cosines.mapv(|c| c * c).mean().unwrap_or(0.0)
    }

    /// Principal angles in degrees, ascending.
    pub fn principal_angles_degrees(&self) -> Array1<f64> {
        self.cosines.mapv(|c| c.clamp(0.0, 1.0).acos().to_degrees())
    }
}

/// Compares the spans of `a` and `b`.
///
/// Both bases are first orthonormalized (QR) so that skewed LDA bases are
/// measured by the space they span, not by their particular axes. The cosines
/// are the singular values of `Qaᵗ·Qb`. The result is symmetric in its
/// arguments and unchanged by any re-ordering, sign flip or in-plane rotation
/// of either basis.
///
/// # Errors
/// `FeatureDimensionMismatch` if the bases live in different feature spaces,
/// `Decomposition` if QR or SVD fails.
pub fn compare_subspaces(a: &Subspace, b: &Subspace) -> Result<SubspaceSimilarity> {
    if a.n_features() != b.n_features() {
        return Err(AnalysisError::FeatureDimensionMismatch {
            left: a.n_features(),
            right: b.n_features(),
        });
    }
    let qa = orthonormal_span(a.basis_matrix())?;
    let qb = orthonormal_span(b.basis_matrix())?;
    let cross = qa.t().dot(&qb);

    let backend = LinAlgBackendProvider::new();
    let svd = backend
        .svd_into(cross, false, false)
        .map_err(|e| AnalysisError::Decomposition(format!("SVD of cross-product failed: {}", e)))?;

    let mut cosines: Vec<f64> = svd.s.iter().map(|&s| s.clamp(0.0, 1.0)).collect();
    cosines.sort_by(|x, y| y.partial_cmp(x).unwrap_or(std::cmp::Ordering::Equal));
    let cosines = Array1::from(cosines);

    debug!(
        "Subspace similarity ({} vs {} dims): cosines {:?}",
        a.n_dims(),
        b.n_dims(),
        cosines
    );
    Ok(SubspaceSimilarity { cosines })
}
