// Multi-class linear discriminant analysis (LDA)

use crate::dataset::FeatureMatrix;
use crate::error::{AnalysisError, Result};
use crate::linalg_backends::{sorted_descending, BackendEigh, LinAlgBackendProvider};
use crate::subspace::{canonical_sign, unit_length, ProvenanceStep, Subspace, SubspaceKind};
use crate::taxonomy::CategoryGrouping;
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Within-class eigenvalues below this fraction of the largest one make the
/// scatter matrix numerically singular.
const SINGULARITY_RATIO: f64 = 1e-10;

/// Configuration for `fit_lda`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LdaConfig {
    /// Number of discriminant dimensions. `None` keeps all usable ones,
    /// i.e. `min(n_features, n_classes - 1)`.
    pub n_dims: Option<usize>,
    /// Shrinks the within-class covariance toward `trace/p · I`; 0 disables.
    pub shrinkage: f64,
    /// Classes smaller than this trigger a low-confidence warning.
    pub min_class_size: usize,
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self {
            n_dims: None,
            shrinkage: 0.0,
            min_class_size: 5,
        }
    }
}

/// Fits a discriminant basis maximizing between-class over within-class variance.
///
/// The pooled within-class covariance `Sw` is whitened with `Sw^{-1/2}`, the
/// whitened between-class covariance is eigendecomposed, and the eigenvectors
/// are mapped back to feature space. Each basis vector has unit length; the
/// vectors are generally not orthogonal (see `Subspace::orthonormalized`).
/// Dimensions are ordered by descending discriminant eigenvalue.
///
/// Empty classes are ignored; classes smaller than `min_class_size` are kept
/// with a warning.
///
/// # Errors
/// `NonFinite` for NaN/infinite data, `ShapeMismatch` if the grouping does not
/// cover the rows, `InvalidParameter` for fewer than two non-empty classes or
/// a shrinkage outside [0, 1], `DimensionBound` if `n_dims` exceeds
/// `min(n_features, n_classes - 1)`, `SingularScatter` if `Sw` cannot be inverted.
pub fn fit_lda(
    data: &FeatureMatrix,
    grouping: &CategoryGrouping,
    config: &LdaConfig,
) -> Result<Subspace> {
    data.ensure_finite()?;
    if grouping.n_documents() != data.n_rows() {
        return Err(AnalysisError::ShapeMismatch(format!(
            "grouping covers {} documents, data has {} rows",
            grouping.n_documents(),
            data.n_rows()
        )));
    }
    if !(0.0..=1.0).contains(&config.shrinkage) {
        return Err(AnalysisError::InvalidParameter(format!(
            "LDA shrinkage must lie in [0, 1], got {}",
            config.shrinkage
        )));
    }

    let values = data.values();
    let n_samples = data.n_rows();
    let n_features = data.n_features();

    let mut classes: Vec<(usize, Vec<usize>)> = Vec::new();
    for (class, rows) in grouping.members().into_iter().enumerate() {
        let name = &grouping.classes()[class];
        if rows.is_empty() {
            warn!("LDA ({}): class '{}' has no documents and is ignored.", grouping.level(), name);
            continue;
        }
        if rows.len() < config.min_class_size {
            warn!(
                "LDA ({}): class '{}' has only {} documents; its discriminant contribution is low-confidence.",
                grouping.level(),
                name,
                rows.len()
            );
        }
        classes.push((class, rows));
    }

    let n_classes = classes.len();
    if n_classes < 2 {
        return Err(AnalysisError::InvalidParameter(format!(
            "LDA needs at least 2 non-empty classes, got {}",
            n_classes
        )));
    }
    if n_samples <= n_classes {
        return Err(AnalysisError::InvalidParameter(format!(
            "LDA needs more samples ({}) than classes ({})",
            n_samples, n_classes
        )));
    }

    let bound = n_features.min(n_classes - 1);
    let n_dims = config.n_dims.unwrap_or(bound);
    if n_dims > bound {
        return Err(AnalysisError::DimensionBound {
            method: "LDA",
            requested: n_dims,
            bound,
        });
    }

    let overall_mean = values
        .mean_axis(Axis(0))
        .ok_or_else(|| AnalysisError::InvalidParameter("matrix has no rows".to_owned()))?;

    // Rows centered on their own class mean, and sqrt(n_c)-weighted class offsets.
    let mut within_centered = values.to_owned();
    let mut weighted_offsets = Array2::<f64>::zeros((n_classes, n_features));
    for (k, (_, rows)) in classes.iter().enumerate() {
        let class_mean = values
            .select(Axis(0), rows)
            .mean_axis(Axis(0))
            .ok_or_else(|| AnalysisError::InvalidParameter("empty class".to_owned()))?;
        for &r in rows {
            let mut row = within_centered.row_mut(r);
            row -= &class_mean;
        }
        let offset = (&class_mean - &overall_mean) * (rows.len() as f64).sqrt();
        weighted_offsets.row_mut(k).assign(&offset);
    }

    let mut within_cov = within_centered.t().dot(&within_centered);
    within_cov /= (n_samples - n_classes) as f64;
    let mut between_cov = weighted_offsets.t().dot(&weighted_offsets);
    between_cov /= (n_classes - 1) as f64;

    if config.shrinkage > 0.0 {
        let target = within_cov.diag().sum() / n_features as f64;
        within_cov *= 1.0 - config.shrinkage;
        for i in 0..n_features {
            within_cov[[i, i]] += config.shrinkage * target;
        }
    }

    let whitening = inverse_sqrt(&within_cov)?;
    let mut whitened_between = whitening.dot(&between_cov).dot(&whitening);
    whitened_between = (&whitened_between + &whitened_between.t()) * 0.5;

    let backend = LinAlgBackendProvider::new();
    let decomposition = backend.eigh_upper(&whitened_between).map_err(|e| {
        AnalysisError::Decomposition(format!(
            "Eigen decomposition of whitened between-class matrix failed: {}",
            e
        ))
    })?;
    let (eigenvalues, eigenvectors) = sorted_descending(decomposition);

    let mut basis = Array2::<f64>::zeros((n_features, n_dims));
    for k in 0..n_dims {
        let direction = whitening.dot(&eigenvectors.column(k));
        basis
            .slice_mut(s![.., k])
            .assign(&canonical_sign(unit_length(direction)));
    }
    let discriminant_values: Array1<f64> = eigenvalues.slice(s![..n_dims]).mapv(|v| v.max(0.0));

    debug!("LDA ({}) eigenvalues: {:?}", grouping.level(), discriminant_values);
    info!(
        "Fitted LDA ({}) with {} dimensions from {} classes, {} samples x {} features.",
        grouping.level(),
        n_dims,
        n_classes,
        n_samples,
        n_features
    );

    Ok(Subspace::from_parts(
        SubspaceKind::Lda,
        data.feature_names().to_vec(),
        basis,
        Some(overall_mean),
        Some(discriminant_values),
        ProvenanceStep::Fitted {
            kind: SubspaceKind::Lda,
            n_rows: n_samples,
            grouping: Some(grouping.level().to_owned()),
        },
    ))
}

/// `M^{-1/2}` of a symmetric positive definite matrix.
fn inverse_sqrt(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let backend = LinAlgBackendProvider::new();
    let decomposition = backend.eigh_upper(matrix).map_err(|e| {
        AnalysisError::Decomposition(format!(
            "Eigen decomposition of within-class matrix failed: {}",
            e
        ))
    })?;
    let largest = decomposition.eigenvalues.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let smallest = decomposition.eigenvalues.fold(f64::INFINITY, |a, &b| a.min(b));
    if !(largest > 0.0) || smallest <= largest * SINGULARITY_RATIO {
        return Err(AnalysisError::SingularScatter { smallest });
    }
    let inv_sqrt = decomposition.eigenvalues.mapv(|v| 1.0 / v.sqrt());
    let vectors = &decomposition.eigenvectors;
    Ok((vectors * &inv_sqrt).dot(&vectors.t()))
}

/// Nearest-centroid classifier in a projected space.
///
/// Used to check how well projected scores separate the classes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CentroidClassifier {
    /// Class index (into the grouping's classes) per centroid row.
    classes: Vec<usize>,
    /// Shape: (n_present_classes, n_dims)
    centroids: Array2<f64>,
}

impl CentroidClassifier {
    /// Learns one centroid per class that occurs in `assignments`.
    pub fn fit(scores: &Array2<f64>, assignments: &[usize]) -> Result<Self> {
        if scores.nrows() != assignments.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} score rows but {} class labels",
                scores.nrows(),
                assignments.len()
            )));
        }
        let mut classes: Vec<usize> = assignments.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.is_empty() {
            return Err(AnalysisError::InvalidParameter(
                "cannot train a classifier without samples".to_owned(),
            ));
        }

        let mut centroids = Array2::<f64>::zeros((classes.len(), scores.ncols()));
        for (k, &class) in classes.iter().enumerate() {
            let rows: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|&(_, &a)| a == class)
                .map(|(r, _)| r)
                .collect();
            if let Some(mean) = scores.select(Axis(0), &rows).mean_axis(Axis(0)) {
                centroids.row_mut(k).assign(&mean);
            }
        }
        Ok(Self { classes, centroids })
    }

    fn nearest(&self, point: ArrayView1<f64>) -> usize {
        let mut best = (f64::INFINITY, self.classes[0]);
        for (centroid, &class) in self.centroids.rows().into_iter().zip(&self.classes) {
            let distance = (&centroid - &point).mapv(|d| d * d).sum();
            if distance < best.0 {
                best = (distance, class);
            }
        }
        best.1
    }

    pub fn predict(&self, scores: &Array2<f64>) -> Result<Vec<usize>> {
        if scores.ncols() != self.centroids.ncols() {
            return Err(AnalysisError::DimensionCountMismatch {
                left: scores.ncols(),
                right: self.centroids.ncols(),
            });
        }
        Ok(scores.rows().into_iter().map(|row| self.nearest(row)).collect())
    }

    /// Fraction of rows whose predicted class equals `assignments`.
    pub fn accuracy(&self, scores: &Array2<f64>, assignments: &[usize]) -> Result<f64> {
        let predicted = self.predict(scores)?;
        if predicted.len() != assignments.len() || predicted.is_empty() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} predictions for {} labels",
                predicted.len(),
                assignments.len()
            )));
        }
        let correct = predicted
            .iter()
            .zip(assignments)
            .filter(|(p, a)| p == a)
            .count();
        Ok(correct as f64 / assignments.len() as f64)
    }
}
