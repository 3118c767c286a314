// src/report.rs

//! Numeric inputs for figures: colour/order lookups, weight tables and
//! per-class box-plot summaries. Drawing happens elsewhere.

use crate::error::{AnalysisError, Result};
use crate::subspace::{Projection, Subspace};
use crate::taxonomy::CategoryGrouping;
use log::debug;
use ndarray::ArrayView1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Qualitative palette, cycled when a grouping has more classes.
pub const DEFAULT_PALETTE: [&str; 12] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf", "#393b79", "#ad494a",
];

/// Class order and colours for one grouping, handed explicitly to whatever draws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub level: String,
    /// Class codes in canonical order.
    pub order: Vec<String>,
    /// Display labels, parallel to `order`.
    pub labels: Vec<String>,
    pub colours: BTreeMap<String, String>,
}

impl RenderConfig {
    pub fn for_grouping(grouping: &CategoryGrouping) -> Self {
        Self::with_palette(grouping, &DEFAULT_PALETTE)
    }

    /// Like `for_grouping` with a caller-supplied palette. An empty palette
    /// falls back to the default one.
    pub fn with_palette(grouping: &CategoryGrouping, palette: &[&str]) -> Self {
        let palette = if palette.is_empty() { &DEFAULT_PALETTE[..] } else { palette };
        let colours = grouping
            .classes()
            .iter()
            .enumerate()
            .map(|(i, class)| (class.clone(), palette[i % palette.len()].to_owned()))
            .collect();
        Self {
            level: grouping.level().to_owned(),
            order: grouping.classes().to_vec(),
            labels: grouping.labels().to_vec(),
            colours,
        }
    }

    pub fn colour(&self, class: &str) -> Option<&str> {
        self.colours.get(class).map(String::as_str)
    }

    /// Position of `class` in the canonical order.
    pub fn rank(&self, class: &str) -> Option<usize> {
        self.order.iter().position(|c| c == class)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Features of dimension `dim` sorted by descending absolute weight, at most `top_n` of them.
pub fn weight_table(subspace: &Subspace, dim: usize, top_n: usize) -> Result<Vec<FeatureWeight>> {
    if dim >= subspace.n_dims() {
        return Err(AnalysisError::DimensionBound {
            method: "weight table",
            requested: dim + 1,
            bound: subspace.n_dims(),
        });
    }
    let column = subspace.basis_matrix().column(dim);
    let mut rows: Vec<FeatureWeight> = subspace
        .feature_names()
        .iter()
        .zip(column.iter())
        .map(|(feature, &weight)| FeatureWeight {
            feature: feature.clone(),
            weight,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.weight
            .abs()
            .partial_cmp(&a.weight.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows.truncate(top_n);
    Ok(rows)
}

/// Box-plot numbers for one class along one dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub class: String,
    pub label: String,
    pub n: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

/// Per-class summaries of the scores on dimension `dim`, in canonical class
/// order. Classes without documents are left out.
///
/// Quartiles interpolate linearly between order statistics.
pub fn group_summaries(
    projection: &Projection,
    grouping: &CategoryGrouping,
    dim: usize,
) -> Result<Vec<GroupSummary>> {
    let scores = projection.scores.as_ref().ok_or_else(|| {
        AnalysisError::InvalidParameter("projection carries no scores".to_owned())
    })?;
    if scores.nrows() != grouping.n_documents() {
        return Err(AnalysisError::ShapeMismatch(format!(
            "projection has {} rows, grouping covers {} documents",
            scores.nrows(),
            grouping.n_documents()
        )));
    }
    if dim >= scores.ncols() {
        return Err(AnalysisError::DimensionBound {
            method: "group summary",
            requested: dim + 1,
            bound: scores.ncols(),
        });
    }

    let column = scores.column(dim);
    let mut summaries = Vec::with_capacity(grouping.n_classes());
    for (class, rows) in grouping.members().into_iter().enumerate() {
        if rows.is_empty() {
            debug!("No documents in class '{}'; skipping its summary.", grouping.classes()[class]);
            continue;
        }
        summaries.push(summarize(
            &grouping.classes()[class],
            &grouping.labels()[class],
            column,
            &rows,
        ));
    }
    Ok(summaries)
}

fn summarize(class: &str, label: &str, column: ArrayView1<f64>, rows: &[usize]) -> GroupSummary {
    let mut values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    GroupSummary {
        class: class.to_owned(),
        label: label.to_owned(),
        n,
        min: values[0],
        q1: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q3: quantile(&values, 0.75),
        max: values[n - 1],
        mean: values.iter().sum::<f64>() / n as f64,
    }
}

/// `sorted` must be non-empty and ascending.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// A shuffled order of `0..n`, reproducible from `seed`. Only for draw order
/// in scatterplots so no class is systematically painted on top.
pub fn display_permutation(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    order
}
