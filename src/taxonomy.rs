// src/taxonomy.rs

use crate::dataset::Metadata;
use crate::error::{AnalysisError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One category at one granularity level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// Code used in the metadata table, e.g. "S1A".
    pub code: String,
    /// Short display label, e.g. "dialogue".
    pub label: String,
    /// Long display name.
    pub name: String,
    /// Position in the canonical display order.
    pub order: usize,
}

/// Category codes and their canonical ordering at every granularity level
/// (e.g. 12, 20 and 32 categories).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTaxonomy {
    levels: BTreeMap<String, Vec<CategoryEntry>>,
}

impl CategoryTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a granularity level. Entries are kept sorted by `order`.
    pub fn with_level(mut self, level: impl Into<String>, mut entries: Vec<CategoryEntry>) -> Self {
        entries.sort_by_key(|e| e.order);
        self.levels.insert(level.into(), entries);
        self
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.levels.keys().map(String::as_str)
    }

    pub fn entries(&self, level: &str) -> Option<&[CategoryEntry]> {
        self.levels.get(level).map(Vec::as_slice)
    }

    /// Partitions the documents into the classes of `level`.
    ///
    /// # Errors
    /// `InvalidParameter` if the level is unknown, `MissingCategoryLevel` if a
    /// document carries no code for it, `UnknownCategory` if a code is not listed.
    pub fn grouping(&self, level: &str, metadata: &Metadata) -> Result<CategoryGrouping> {
        let entries = self.entries(level).ok_or_else(|| {
            AnalysisError::InvalidParameter(format!("taxonomy has no level '{}'", level))
        })?;
        let index_of: HashMap<&str, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.code.as_str(), i))
            .collect();

        let mut assignments = Vec::with_capacity(metadata.len());
        for record in metadata.records() {
            let code = record.category(level).ok_or_else(|| AnalysisError::MissingCategoryLevel {
                id: record.id.clone(),
                level: level.to_owned(),
            })?;
            let class = index_of.get(code).ok_or_else(|| AnalysisError::UnknownCategory {
                id: record.id.clone(),
                level: level.to_owned(),
                code: code.to_owned(),
            })?;
            assignments.push(*class);
        }

        let grouping = CategoryGrouping {
            level: level.to_owned(),
            classes: entries.iter().map(|e| e.code.clone()).collect(),
            labels: entries.iter().map(|e| e.label.clone()).collect(),
            assignments,
        };
        for (class, size) in grouping.classes.iter().zip(grouping.class_sizes()) {
            if size == 0 {
                warn!("Category '{}' at level '{}' has no documents.", class, level);
            }
        }
        Ok(grouping)
    }
}

/// A partition of documents into named classes with a fixed canonical order.
///
/// `assignments[row]` is the index into `classes` of the document at `row`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryGrouping {
    level: String,
    classes: Vec<String>,
    labels: Vec<String>,
    assignments: Vec<usize>,
}

impl CategoryGrouping {
    /// Builds a grouping from one label per document.
    ///
    /// With `canonical_order` the classes follow that order, and every label must
    /// appear in it. Without it, classes are sorted lexicographically.
    pub fn from_labels(
        level: impl Into<String>,
        labels: &[String],
        canonical_order: Option<&[String]>,
    ) -> Result<Self> {
        let level = level.into();
        let classes: Vec<String> = match canonical_order {
            Some(order) => order.to_vec(),
            None => {
                let mut distinct: Vec<String> = labels.to_vec();
                distinct.sort();
                distinct.dedup();
                distinct
            }
        };
        let index_of: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let assignments = labels
            .iter()
            .enumerate()
            .map(|(row, label)| {
                index_of.get(label.as_str()).copied().ok_or_else(|| {
                    AnalysisError::UnknownCategory {
                        id: format!("row {}", row),
                        level: level.clone(),
                        code: label.clone(),
                    }
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(Self {
            level,
            labels: classes.clone(),
            classes,
            assignments,
        })
    }

    /// Checks that labels parallel the classes and every assignment names a class.
    pub(crate) fn check_shape(&self) -> Result<()> {
        if self.labels.len() != self.classes.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "grouping '{}' has {} labels for {} classes",
                self.level,
                self.labels.len(),
                self.classes.len()
            )));
        }
        if let Some((row, &a)) = self
            .assignments
            .iter()
            .enumerate()
            .find(|&(_, &a)| a >= self.classes.len())
        {
            return Err(AnalysisError::ShapeMismatch(format!(
                "grouping '{}' assigns row {} to class {} of {}",
                self.level,
                row,
                a,
                self.classes.len()
            )));
        }
        Ok(())
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    /// Class codes in canonical order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Display labels, parallel to `classes`.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn n_documents(&self) -> usize {
        self.assignments.len()
    }

    pub fn class_of(&self, row: usize) -> &str {
        &self.classes[self.assignments[row]]
    }

    pub fn class_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.classes.len()];
        for &a in &self.assignments {
            sizes[a] += 1;
        }
        sizes
    }

    /// Row indices of each class, in canonical class order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.classes.len()];
        for (row, &a) in self.assignments.iter().enumerate() {
            members[a].push(row);
        }
        members
    }

    /// Restricts the grouping to the given rows (e.g. after filtering).
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            level: self.level.clone(),
            classes: self.classes.clone(),
            labels: self.labels.clone(),
            assignments: rows.iter().map(|&r| self.assignments[r]).collect(),
        }
    }
}
