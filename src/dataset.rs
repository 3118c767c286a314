// src/dataset.rs

use crate::error::{AnalysisError, Result};
use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Numeric feature table: one row per document, one column per linguistic feature.
///
/// Values are never modified in place. Transformations produce a new matrix
/// through `with_values`, which keeps the row identifiers and feature names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    ids: Vec<String>,
    feature_names: Vec<String>,
    /// Shape: (n_documents, n_features)
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Builds a feature matrix, rejecting duplicate identifiers or feature names
    /// and label vectors that do not fit the value shape.
    pub fn new(ids: Vec<String>, feature_names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if ids.len() != values.nrows() || feature_names.len() != values.ncols() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} ids and {} feature names for a {}x{} value matrix",
                ids.len(),
                feature_names.len(),
                values.nrows(),
                values.ncols()
            )));
        }
        let duplicate_ids = duplicates(&ids);
        if !duplicate_ids.is_empty() {
            return Err(AnalysisError::DuplicateIds { table: "feature", ids: duplicate_ids });
        }
        let duplicate_names = duplicates(&feature_names);
        if !duplicate_names.is_empty() {
            return Err(AnalysisError::DuplicateFeatures { names: duplicate_names });
        }
        Ok(Self { ids, feature_names, values })
    }

    /// Re-checks the table shape of a value that bypassed `new`, e.g. one read back from disk.
    pub(crate) fn check_shape(&self) -> Result<()> {
        if self.ids.len() != self.values.nrows() || self.feature_names.len() != self.values.ncols() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} ids and {} feature names for a {}x{} value matrix",
                self.ids.len(),
                self.feature_names.len(),
                self.values.nrows(),
                self.values.ncols()
            )));
        }
        Ok(())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Same labels, new values. The shape must not change.
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self> {
        if values.dim() != self.values.dim() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "replacement values are {:?}, expected {:?}",
                values.dim(),
                self.values.dim()
            )));
        }
        Ok(Self {
            ids: self.ids.clone(),
            feature_names: self.feature_names.clone(),
            values,
        })
    }

    /// Keeps the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            ids: rows.iter().map(|&r| self.ids[r].clone()).collect(),
            feature_names: self.feature_names.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }

    /// Keeps the given feature columns, in the given order.
    pub fn select_features(&self, columns: &[usize]) -> Self {
        Self {
            ids: self.ids.clone(),
            feature_names: columns.iter().map(|&c| self.feature_names[c].clone()).collect(),
            values: self.values.select(Axis(1), columns),
        }
    }

    /// Identifiers of rows holding NaN or infinite values.
    pub fn non_finite_rows(&self) -> Vec<String> {
        self.values
            .axis_iter(Axis(0))
            .zip(self.ids.iter())
            .filter(|(row, _)| row.iter().any(|v| !v.is_finite()))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Fails with `NonFinite` if any value is NaN or infinite.
    pub fn ensure_finite(&self) -> Result<()> {
        let rows = self.non_finite_rows();
        if rows.is_empty() {
            Ok(())
        } else {
            Err(AnalysisError::NonFinite { rows })
        }
    }
}

/// Per-document attributes, keyed by the same identifier as the feature table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: String,
    /// Variety of English (e.g. "GB", "IND").
    pub variety: String,
    /// "spoken" / "written".
    pub mode: String,
    pub format: String,
    /// Category code per granularity level, e.g. `"cat12" -> "S1A"`.
    pub categories: BTreeMap<String, String>,
    pub words: u64,
    pub sentences: u64,
}

impl DocumentMeta {
    pub fn category(&self, level: &str) -> Option<&str> {
        self.categories.get(level).map(String::as_str)
    }
}

/// Metadata records in the same order as the rows of the paired feature matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    records: Vec<DocumentMeta>,
}

impl Metadata {
    pub fn records(&self) -> &[DocumentMeta] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            records: rows.iter().map(|&r| self.records[r].clone()).collect(),
        }
    }
}

/// A feature matrix and its metadata with identical identifier sequences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    features: FeatureMatrix,
    metadata: Metadata,
}

/// Which metadata attribute exclusion rates are reported by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKey {
    Variety,
    /// Category code at the named granularity level.
    Category(String),
}

impl GroupKey {
    fn label_of(&self, record: &DocumentMeta) -> String {
        match self {
            GroupKey::Variety => record.variety.clone(),
            GroupKey::Category(level) => record
                .category(level)
                .map(str::to_owned)
                .unwrap_or_else(|| "<none>".to_owned()),
        }
    }
}

/// Minimum text size. Documents must satisfy both thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeFilter {
    pub min_words: u64,
    pub min_sentences: u64,
    pub group_by: GroupKey,
}

impl Default for SizeFilter {
    fn default() -> Self {
        Self {
            min_words: 100,
            min_sentences: 5,
            group_by: GroupKey::Variety,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupExclusion {
    pub total: usize,
    pub excluded: usize,
}

impl GroupExclusion {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.excluded as f64 / self.total as f64
        }
    }
}

/// Quality-control summary of a size filter run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub kept: usize,
    pub excluded_ids: Vec<String>,
    pub per_group: BTreeMap<String, GroupExclusion>,
}

/// Aligns a feature table with its metadata.
///
/// Every feature row needs exactly one metadata record; metadata records without
/// a feature row are dropped. The returned metadata follows the feature row order.
///
/// # Errors
/// `DuplicateIds` if either table repeats an identifier, `MissingMetadata`
/// listing every feature identifier without a record.
pub fn align_tables(features: FeatureMatrix, metadata: Vec<DocumentMeta>) -> Result<Corpus> {
    let meta_ids: Vec<String> = metadata.iter().map(|m| m.id.clone()).collect();
    let duplicate_meta = duplicates(&meta_ids);
    if !duplicate_meta.is_empty() {
        return Err(AnalysisError::DuplicateIds { table: "metadata", ids: duplicate_meta });
    }

    let mut by_id: HashMap<String, DocumentMeta> =
        metadata.into_iter().map(|m| (m.id.clone(), m)).collect();

    let missing: Vec<String> = features
        .ids()
        .iter()
        .filter(|id| !by_id.contains_key(id.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::MissingMetadata { ids: missing });
    }

    let records: Vec<DocumentMeta> = features
        .ids()
        .iter()
        .filter_map(|id| by_id.remove(id.as_str()))
        .collect();

    if !by_id.is_empty() {
        info!(
            "Dropped {} metadata records without a matching feature row.",
            by_id.len()
        );
        debug!("Unmatched metadata ids: {:?}", by_id.keys().collect::<Vec<_>>());
    }
    info!(
        "Aligned {} documents with {} features.",
        features.n_rows(),
        features.n_features()
    );
    Ok(Corpus {
        features,
        metadata: Metadata { records },
    })
}

impl Corpus {
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn ids(&self) -> &[String] {
        self.features.ids()
    }

    pub fn len(&self) -> usize {
        self.features.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keeps the given rows in both tables.
    pub fn select_rows(&self, rows: &[usize]) -> Corpus {
        Corpus {
            features: self.features.select_rows(rows),
            metadata: self.metadata.select_rows(rows),
        }
    }

    /// Removes short texts from both tables and reports exclusion per group.
    pub fn filter_min_size(&self, filter: &SizeFilter) -> (Corpus, FilterReport) {
        let mut report = FilterReport::default();
        let mut kept_rows = Vec::with_capacity(self.len());

        for (row, record) in self.metadata.records.iter().enumerate() {
            let group = report.per_group.entry(filter.group_by.label_of(record)).or_default();
            group.total += 1;
            if record.words >= filter.min_words && record.sentences >= filter.min_sentences {
                kept_rows.push(row);
            } else {
                group.excluded += 1;
                report.excluded_ids.push(record.id.clone());
            }
        }
        report.kept = kept_rows.len();

        for (group, counts) in &report.per_group {
            info!(
                "Size filter: group '{}' excluded {}/{} documents ({:.1}%).",
                group,
                counts.excluded,
                counts.total,
                100.0 * counts.rate()
            );
        }
        info!(
            "Size filter (words >= {}, sentences >= {}) kept {} of {} documents.",
            filter.min_words,
            filter.min_sentences,
            report.kept,
            self.len()
        );

        (self.select_rows(&kept_rows), report)
    }

    /// Drops features whose sample standard deviation is at most `tolerance`.
    /// Returns the reduced corpus and the names of the dropped features.
    pub fn drop_constant_features(&self, tolerance: f64) -> (Corpus, Vec<String>) {
        let values = self.features.values();
        let mut keep = Vec::with_capacity(values.ncols());
        let mut dropped = Vec::new();
        for (c, column) in values.axis_iter(Axis(1)).enumerate() {
            let sd = if column.len() > 1 { column.std(1.0) } else { 0.0 };
            if sd.is_finite() && sd <= tolerance {
                dropped.push(self.features.feature_names()[c].clone());
            } else {
                keep.push(c);
            }
        }
        if !dropped.is_empty() {
            warn!(
                "Dropping {} constant feature(s) before standardization: {:?}",
                dropped.len(),
                dropped
            );
        }
        let corpus = Corpus {
            features: self.features.select_features(&keep),
            metadata: self.metadata.clone(),
        };
        (corpus, dropped)
    }

    /// Replaces the feature matrix with one that has the same identifiers.
    pub fn with_features(&self, features: FeatureMatrix) -> Result<Corpus> {
        if features.ids() != self.features.ids() {
            return Err(AnalysisError::ShapeMismatch(
                "replacement feature matrix has a different identifier sequence".to_owned(),
            ));
        }
        Ok(Corpus {
            features,
            metadata: self.metadata.clone(),
        })
    }
}

fn duplicates(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut reported = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if !seen.insert(item.as_str()) && reported.insert(item.as_str()) {
            out.push(item.clone());
        }
    }
    out
}
