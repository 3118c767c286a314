// src/rotate.rs

use crate::dataset::FeatureMatrix;
use crate::error::{AnalysisError, Result};
use crate::subspace::{orthonormal_span, unit_length, ProvenanceStep, Subspace, NORMALIZATION_THRESHOLD};
use log::debug;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Re-rotates dimensions `first` and `second` of `subspace` within their plane
/// so the new `first` axis carries maximal variance of `data` in that plane.
///
/// The pair is first orthonormalized within its plane (the `first` direction is
/// kept, the `second` one is replaced by its component orthogonal to it), so
/// skewed LDA pairs are handled. The rotation angle then comes from the leading
/// eigenvector of the 2x2 covariance of the two orthonormal score columns. The
/// two new axes are orthonormal and span the same plane. Every other dimension
/// is left untouched, which keeps the discriminant ordering outside the pair
/// intact. The new `first` axis keeps a non-negative component along the old one.
///
/// # Errors
/// `FeatureDimensionMismatch` if `data` has a different feature count,
/// `ShapeMismatch` if the feature names differ, `InvalidParameter` if
/// `first == second` or the two vectors are collinear, `DimensionBound` for an
/// out-of-range index, `NonFinite` for non-finite data.
pub fn rotate_pair(
    subspace: &Subspace,
    data: &FeatureMatrix,
    first: usize,
    second: usize,
) -> Result<Subspace> {
    if data.n_features() != subspace.n_features() {
        return Err(AnalysisError::FeatureDimensionMismatch {
            left: subspace.n_features(),
            right: data.n_features(),
        });
    }
    if data.feature_names() != subspace.feature_names() {
        return Err(AnalysisError::ShapeMismatch(
            "data feature names do not match the subspace's features".to_owned(),
        ));
    }
    if first == second {
        return Err(AnalysisError::InvalidParameter(format!(
            "pair rotation needs two distinct dimensions, got {} twice",
            first
        )));
    }
    let largest = first.max(second);
    if largest >= subspace.n_dims() {
        return Err(AnalysisError::DimensionBound {
            method: "pair rotation",
            requested: largest + 1,
            bound: subspace.n_dims(),
        });
    }
    data.ensure_finite()?;
    if data.n_rows() < 2 {
        return Err(AnalysisError::InvalidParameter(
            "pair rotation needs at least 2 rows of data".to_owned(),
        ));
    }

    let raw_pair = subspace.basis_matrix().select(Axis(1), &[first, second]);
    let pair = orthonormal_span(&raw_pair)?;
    let residual = pair.column(1).dot(&raw_pair.column(1)).abs();
    if residual <= NORMALIZATION_THRESHOLD {
        return Err(AnalysisError::InvalidParameter(format!(
            "dimensions {} and {} are collinear and span no plane",
            first, second
        )));
    }
    let scores = match subspace.center() {
        Some(center) => (data.values() - center).dot(&pair),
        None => data.values().dot(&pair),
    };
    let centered = &scores - &scores.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(2));
    let cov = centered.t().dot(&centered) / (data.n_rows() - 1) as f64;

    // Leading eigenvector of [[a, b], [b, c]] is (cos t, sin t), t = atan2(2b, a - c) / 2.
    let angle = 0.5 * (2.0 * cov[[0, 1]]).atan2(cov[[0, 0]] - cov[[1, 1]]);
    let (sin_t, cos_t) = angle.sin_cos();
    debug!(
        "Rotating dimensions {} and {} by {:.4} rad (variances {:.4}, {:.4}, covariance {:.4}).",
        first,
        second,
        angle,
        cov[[0, 0]],
        cov[[1, 1]],
        cov[[0, 1]]
    );

    let old_first = pair.column(0);
    let old_second = pair.column(1);
    let new_first = unit_length(&old_first * cos_t + &old_second * sin_t);
    let new_second = unit_length(&old_second * cos_t - &old_first * sin_t);

    let mut basis = subspace.basis_matrix().clone();
    basis.column_mut(first).assign(&new_first);
    basis.column_mut(second).assign(&new_second);

    Ok(subspace.derive(
        basis,
        subspace.dim_names().to_vec(),
        None,
        ProvenanceStep::PairRotated {
            first,
            second,
            angle_radians: angle,
        },
    ))
}

/// How `match_to_reference` pairs dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Repeatedly takes the most similar remaining pair.
    Greedy,
    /// Maximizes the summed absolute cosine over all one-to-one pairings.
    #[default]
    Optimal,
}

/// A basis re-expressed in a reference basis's axis order.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedSubspace {
    pub subspace: Subspace,
    /// `assignment[l]` is the original dimension placed at reference position `l`.
    pub assignment: Vec<usize>,
    /// Whether the dimension placed at position `l` was sign-flipped.
    pub flipped: Vec<bool>,
    /// Absolute cosine between position `l` and reference dimension `l`.
    pub cosines: Array1<f64>,
}

/// Reorders and sign-flips the dimensions of `subspace` to line up with
/// `reference`, dimension by dimension, by absolute cosine similarity.
///
/// Neither input is modified. The spans are unchanged, so subspace
/// similarity is the same before and after matching.
///
/// # Errors
/// `FeatureDimensionMismatch` or `DimensionCountMismatch` if the two bases differ in shape.
pub fn match_to_reference(
    subspace: &Subspace,
    reference: &Subspace,
    strategy: MatchStrategy,
) -> Result<MatchedSubspace> {
    if subspace.n_features() != reference.n_features() {
        return Err(AnalysisError::FeatureDimensionMismatch {
            left: subspace.n_features(),
            right: reference.n_features(),
        });
    }
    if subspace.n_dims() != reference.n_dims() {
        return Err(AnalysisError::DimensionCountMismatch {
            left: subspace.n_dims(),
            right: reference.n_dims(),
        });
    }

    let signed = cosine_matrix(subspace.basis_matrix(), reference.basis_matrix());
    let similarity = signed.mapv(f64::abs);
    // rows: reference positions, value: original dimension
    let assignment = match strategy {
        MatchStrategy::Greedy => greedy_assignment(&similarity),
        MatchStrategy::Optimal => optimal_assignment(&similarity),
    };

    let n_dims = subspace.n_dims();
    let mut basis = Array2::<f64>::zeros((subspace.n_features(), n_dims));
    let mut flipped = Vec::with_capacity(n_dims);
    let mut cosines = Array1::<f64>::zeros(n_dims);
    let mut names = Vec::with_capacity(n_dims);
    for (position, &original) in assignment.iter().enumerate() {
        let flip = signed[[original, position]] < 0.0;
        let column = subspace.basis_matrix().column(original);
        if flip {
            basis.column_mut(position).assign(&column.mapv(|v| -v));
        } else {
            basis.column_mut(position).assign(&column);
        }
        flipped.push(flip);
        cosines[position] = similarity[[original, position]];
        names.push(subspace.dim_names()[original].clone());
    }
    let eigenvalues = subspace
        .eigenvalues()
        .map(|ev| ev.select(Axis(0), &assignment));

    debug!(
        "Matched dimensions {:?} (flipped {:?}) with cosines {:?}.",
        assignment, flipped, cosines
    );

    let matched = subspace.derive(
        basis,
        names,
        eigenvalues,
        ProvenanceStep::Matched {
            reference: reference.dim_names().to_vec(),
            assignment: assignment.clone(),
            flipped: flipped.clone(),
        },
    );
    Ok(MatchedSubspace {
        subspace: matched,
        assignment,
        flipped,
        cosines,
    })
}

/// Cosine between column `i` of `a` and column `j` of `b`; zero columns give 0.
fn cosine_matrix(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let a_norms = a.map_axis(Axis(0), |c| c.dot(&c).sqrt());
    let b_norms = b.map_axis(Axis(0), |c| c.dot(&c).sqrt());
    let mut cos = a.t().dot(b);
    for ((i, j), v) in cos.indexed_iter_mut() {
        let denom = a_norms[i] * b_norms[j];
        *v = if denom > 0.0 { *v / denom } else { 0.0 };
    }
    cos
}

/// `similarity[[i, j]]`: dimension `i` against reference position `j`.
/// Returns, per reference position, the chosen dimension.
fn greedy_assignment(similarity: &Array2<f64>) -> Vec<usize> {
    let n = similarity.nrows();
    let mut pairs: Vec<(f64, usize, usize)> = similarity
        .indexed_iter()
        .map(|((i, j), &v)| (v, i, j))
        .collect();
    // Ties keep (row, column) order for determinism.
    pairs.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    let mut row_used = vec![false; n];
    let mut assignment = vec![usize::MAX; n];
    let mut remaining = n;
    for (_, i, j) in pairs {
        if remaining == 0 {
            break;
        }
        if row_used[i] || assignment[j] != usize::MAX {
            continue;
        }
        row_used[i] = true;
        assignment[j] = i;
        remaining -= 1;
    }
    assignment
}

/// Hungarian algorithm (shortest augmenting paths with potentials) on the cost
/// `1 - similarity`. O(n^3).
fn optimal_assignment(similarity: &Array2<f64>) -> Vec<usize> {
    let n = similarity.nrows();
    if n == 0 {
        return Vec::new();
    }
    let cost = |i: usize, j: usize| 1.0 - similarity[[i - 1, j - 1]];

    // 1-based arrays; column 0 is the virtual start.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut matched_row = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0;
        let mut min_v = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost(i0, j) - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }
            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=n).map(|j| matched_row[j] - 1).collect()
}
