// src/subspace.rs

use crate::dataset::FeatureMatrix;
use crate::error::{AnalysisError, Result};
use crate::linalg_backends::{BackendQR, LinAlgBackendProvider};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Columns whose norm falls below this are treated as zero vectors.
pub(crate) const NORMALIZATION_THRESHOLD: f64 = 1e-9;

/// How a basis was originally obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubspaceKind {
    Pca,
    Lda,
}

/// One step in the history of a subspace value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProvenanceStep {
    Fitted { kind: SubspaceKind, n_rows: usize, grouping: Option<String> },
    Orthonormalized,
    DimensionsSelected { dims: Vec<usize> },
    PairRotated { first: usize, second: usize, angle_radians: f64 },
    Matched { reference: Vec<String>, assignment: Vec<usize>, flipped: Vec<bool> },
}

/// What `Subspace::project` should return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Which {
    Scores,
    Basis,
    Both,
}

/// Result of projecting a feature matrix through a subspace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub row_ids: Vec<String>,
    pub dim_names: Vec<String>,
    /// Latent coordinates. Shape: (n_rows, n_dims)
    pub scores: Option<Array2<f64>>,
    /// Basis vectors in feature space. Shape: (n_features, n_dims)
    pub basis: Option<Array2<f64>>,
}

/// A set of basis vectors in feature space defining a linear map to a latent space.
///
/// Values are immutable: rotation, alignment, selection and orthonormalization
/// all return a new `Subspace` with an extended provenance log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subspace {
    kind: SubspaceKind,
    feature_names: Vec<String>,
    dim_names: Vec<String>,
    /// One basis vector per column. Shape: (n_features, n_dims)
    basis: Array2<f64>,
    /// Subtracted from data rows before projection. Shape: (n_features)
    center: Option<Array1<f64>>,
    /// Variance (PCA) or discriminant ratio (LDA) per dimension, descending.
    eigenvalues: Option<Array1<f64>>,
    provenance: Vec<ProvenanceStep>,
}

impl Subspace {
    pub(crate) fn from_parts(
        kind: SubspaceKind,
        feature_names: Vec<String>,
        basis: Array2<f64>,
        center: Option<Array1<f64>>,
        eigenvalues: Option<Array1<f64>>,
        fitted: ProvenanceStep,
    ) -> Self {
        let prefix = match kind {
            SubspaceKind::Pca => "PC",
            SubspaceKind::Lda => "LD",
        };
        let dim_names = (1..=basis.ncols()).map(|k| format!("{}{}", prefix, k)).collect();
        Self {
            kind,
            feature_names,
            dim_names,
            basis,
            center,
            eigenvalues,
            provenance: vec![fitted],
        }
    }

    /// Builds a derived subspace that shares labels and centering with `self`.
    pub(crate) fn derive(
        &self,
        basis: Array2<f64>,
        dim_names: Vec<String>,
        eigenvalues: Option<Array1<f64>>,
        step: ProvenanceStep,
    ) -> Self {
        let mut provenance = self.provenance.clone();
        provenance.push(step);
        Self {
            kind: self.kind,
            feature_names: self.feature_names.clone(),
            dim_names,
            basis,
            center: self.center.clone(),
            eigenvalues,
            provenance,
        }
    }

    pub fn kind(&self) -> SubspaceKind {
        self.kind
    }

    pub fn n_features(&self) -> usize {
        self.basis.nrows()
    }

    pub fn n_dims(&self) -> usize {
        self.basis.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn dim_names(&self) -> &[String] {
        &self.dim_names
    }

    pub fn center(&self) -> Option<&Array1<f64>> {
        self.center.as_ref()
    }

    pub fn eigenvalues(&self) -> Option<&Array1<f64>> {
        self.eigenvalues.as_ref()
    }

    pub fn provenance(&self) -> &[ProvenanceStep] {
        &self.provenance
    }

    /// Checks that names, center and eigenvalues agree with the basis shape.
    pub(crate) fn check_shape(&self) -> Result<()> {
        let (n_features, n_dims) = self.basis.dim();
        if self.feature_names.len() != n_features || self.dim_names.len() != n_dims {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} feature names and {} dimension names for a {}x{} basis",
                self.feature_names.len(),
                self.dim_names.len(),
                n_features,
                n_dims
            )));
        }
        if let Some(center) = &self.center {
            if center.len() != n_features {
                return Err(AnalysisError::FeatureDimensionMismatch {
                    left: n_features,
                    right: center.len(),
                });
            }
        }
        if let Some(eigenvalues) = &self.eigenvalues {
            if eigenvalues.len() != n_dims {
                return Err(AnalysisError::DimensionCountMismatch {
                    left: n_dims,
                    right: eigenvalues.len(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn basis_matrix(&self) -> &Array2<f64> {
        &self.basis
    }

    /// Maps `data` through the basis.
    ///
    /// Scores are `(X - center) · B`.
    ///
    /// # Errors
    /// `FeatureDimensionMismatch` if the feature counts differ, `ShapeMismatch`
    /// if the feature names differ, `NonFinite` for non-finite data when scores
    /// are requested.
    pub fn project(&self, data: &FeatureMatrix, which: Which) -> Result<Projection> {
        if data.n_features() != self.n_features() {
            return Err(AnalysisError::FeatureDimensionMismatch {
                left: data.n_features(),
                right: self.n_features(),
            });
        }
        if data.feature_names() != self.feature_names.as_slice() {
            return Err(AnalysisError::ShapeMismatch(
                "data feature names do not match the subspace's features".to_owned(),
            ));
        }

        let scores = match which {
            Which::Basis => None,
            Which::Scores | Which::Both => {
                data.ensure_finite()?;
                Some(self.scores_of(data.values()))
            }
        };
        let basis = match which {
            Which::Scores => None,
            Which::Basis | Which::Both => Some(self.basis.clone()),
        };
        Ok(Projection {
            row_ids: data.ids().to_vec(),
            dim_names: self.dim_names.clone(),
            scores,
            basis,
        })
    }

    /// Latent coordinates of raw rows; feature dimensions must already match.
    pub(crate) fn scores_of(&self, values: &Array2<f64>) -> Array2<f64> {
        match &self.center {
            Some(center) => (values - center).dot(&self.basis),
            None => values.dot(&self.basis),
        }
    }

    /// Keeps the listed dimensions, in the listed order.
    pub fn select_dims(&self, dims: &[usize]) -> Result<Subspace> {
        if let Some(&bad) = dims.iter().find(|&&d| d >= self.n_dims()) {
            return Err(AnalysisError::DimensionBound {
                method: "dimension selection",
                requested: bad + 1,
                bound: self.n_dims(),
            });
        }
        let basis = self.basis.select(Axis(1), dims);
        let names = dims.iter().map(|&d| self.dim_names[d].clone()).collect();
        let eigenvalues = self.eigenvalues.as_ref().map(|ev| ev.select(Axis(0), dims));
        Ok(self.derive(
            basis,
            names,
            eigenvalues,
            ProvenanceStep::DimensionsSelected { dims: dims.to_vec() },
        ))
    }

    /// The leading `k` dimensions.
    pub fn leading(&self, k: usize) -> Result<Subspace> {
        let dims: Vec<usize> = (0..k).collect();
        self.select_dims(&dims)
    }

    /// Largest absolute deviation of `Bᵗ·B` from the identity.
    pub fn orthonormality_error(&self) -> f64 {
        let gram = self.basis.t().dot(&self.basis);
        gram.indexed_iter()
            .map(|((i, j), &v)| if i == j { (v - 1.0).abs() } else { v.abs() })
            .fold(0.0, f64::max)
    }

    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        self.orthonormality_error() <= tolerance
    }

    /// Order-preserving Gram-Schmidt of the basis (via QR).
    ///
    /// The k-th new vector spans the same flag as the first k old ones and keeps
    /// a non-negative inner product with the k-th old vector. Eigenvalues no
    /// longer describe the new axes and are dropped.
    pub fn orthonormalized(&self) -> Result<Subspace> {
        let q = orthonormal_span(&self.basis)?;
        Ok(self.derive(q, self.dim_names.clone(), None, ProvenanceStep::Orthonormalized))
    }
}

/// Thin Q factor of `basis`, with column signs matched to the input columns.
pub(crate) fn orthonormal_span(basis: &Array2<f64>) -> Result<Array2<f64>> {
    let backend = LinAlgBackendProvider::new();
    let mut q = backend
        .qr_q_factor(basis)
        .map_err(|e| AnalysisError::Decomposition(format!("QR of basis failed: {}", e)))?;
    for (mut q_col, b_col) in q.columns_mut().into_iter().zip(basis.columns()) {
        if q_col.dot(&b_col) < 0.0 {
            q_col.mapv_inplace(|v| -v);
        }
    }
    Ok(q)
}

/// Flips a vector so its largest-magnitude entry is positive.
pub(crate) fn canonical_sign(mut v: Array1<f64>) -> Array1<f64> {
    let mut pivot = 0.0_f64;
    for &x in v.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
    v
}

/// Scales to unit length, or zeroes a vector with negligible norm.
pub(crate) fn unit_length(mut v: Array1<f64>) -> Array1<f64> {
    let norm = v.dot(&v).sqrt();
    if norm > NORMALIZATION_THRESHOLD {
        v.mapv_inplace(|x| x / norm);
    } else {
        v.fill(0.0);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn skewed_subspace() -> Subspace {
        let s = 0.5_f64.sqrt();
        let basis = array![[1.0, s], [0.0, s], [0.0, 0.0]];
        Subspace::from_parts(
            SubspaceKind::Lda,
            vec!["a".into(), "b".into(), "c".into()],
            basis,
            Some(array![1.0, 1.0, 1.0]),
            Some(array![4.0, 1.0]),
            ProvenanceStep::Fitted { kind: SubspaceKind::Lda, n_rows: 0, grouping: None },
        )
    }

    fn data() -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["x".into(), "y".into()],
            vec!["a".into(), "b".into(), "c".into()],
            array![[2.0, 1.0, 5.0], [1.0, 3.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn project_returns_requested_parts() {
        let sub = skewed_subspace();
        let both = sub.project(&data(), Which::Both).unwrap();
        let scores = both.scores.unwrap();
        let s = 0.5_f64.sqrt();
        assert_abs_diff_eq!(scores[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[[0, 1]], s, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[[1, 1]], 2.0 * s, epsilon = 1e-12);
        assert_eq!(both.basis.unwrap().dim(), (3, 2));
        assert_eq!(both.row_ids, vec!["x".to_owned(), "y".to_owned()]);
        assert_eq!(both.dim_names, vec!["LD1".to_owned(), "LD2".to_owned()]);

        let only_basis = sub.project(&data(), Which::Basis).unwrap();
        assert!(only_basis.scores.is_none());
        assert!(only_basis.basis.is_some());
        let only_scores = sub.project(&data(), Which::Scores).unwrap();
        assert!(only_scores.basis.is_none());
    }

    #[test]
    fn project_rejects_wrong_features() {
        let sub = skewed_subspace();
        let narrow = data().select_features(&[0, 1]);
        let err = sub.project(&narrow, Which::Scores).unwrap_err();
        assert!(err.is_dimensionality());

        let renamed = FeatureMatrix::new(
            vec!["x".into()],
            vec!["a".into(), "b".into(), "zzz".into()],
            array![[1.0, 2.0, 3.0]],
        )
        .unwrap();
        assert!(matches!(sub.project(&renamed, Which::Both), Err(AnalysisError::ShapeMismatch(_))));
    }

    #[test]
    fn orthonormalized_keeps_first_axis_and_span() {
        let sub = skewed_subspace();
        assert!(!sub.is_orthonormal(1e-6));
        let ortho = sub.orthonormalized().unwrap();
        assert!(ortho.is_orthonormal(1e-10));
        let q = ortho.basis_matrix();
        assert_abs_diff_eq!(q[[0, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(q[[1, 1]], 1.0, epsilon = 1e-10);
        assert!(ortho.eigenvalues().is_none());
        assert_eq!(ortho.provenance().last(), Some(&ProvenanceStep::Orthonormalized));
        assert_eq!(sub.provenance().len(), 1);
    }

    #[test]
    fn select_dims_reorders_and_checks_bounds() {
        let sub = skewed_subspace();
        let swapped = sub.select_dims(&[1, 0]).unwrap();
        assert_eq!(swapped.dim_names(), &["LD2".to_owned(), "LD1".to_owned()]);
        assert_eq!(swapped.eigenvalues().unwrap(), &array![1.0, 4.0]);
        assert!(sub.select_dims(&[2]).unwrap_err().is_dimensionality());
    }

    #[test]
    fn canonical_sign_makes_largest_entry_positive() {
        let v = canonical_sign(array![0.2, -0.9, 0.3]);
        assert_eq!(v, array![-0.2, 0.9, -0.3]);
    }

    #[test]
    fn check_shape_catches_mismatched_parts() {
        let good = skewed_subspace();
        assert!(good.check_shape().is_ok());

        let mut names = good.clone();
        names.feature_names.pop();
        assert!(matches!(names.check_shape(), Err(AnalysisError::ShapeMismatch(_))));

        let mut dims = good.clone();
        dims.dim_names.push("extra".into());
        assert!(matches!(dims.check_shape(), Err(AnalysisError::ShapeMismatch(_))));

        let mut center = good.clone();
        center.center = Some(array![1.0, 1.0]);
        assert!(matches!(center.check_shape(), Err(AnalysisError::FeatureDimensionMismatch { .. })));

        let mut eigenvalues = good;
        eigenvalues.eigenvalues = Some(array![4.0, 1.0, 0.5]);
        assert!(matches!(eigenvalues.check_shape(), Err(AnalysisError::DimensionCountMismatch { .. })));
    }
}
