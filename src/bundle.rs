// src/bundle.rs

use crate::dataset::{FeatureMatrix, Metadata};
use crate::error::{AnalysisError, Result};
use crate::pipeline::AnalysisConfig;
use crate::report::RenderConfig;
use crate::subspace::Subspace;
use crate::taxonomy::CategoryGrouping;
use crate::transform::FeatureScaling;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Checkpoint of a finished analysis, for reloading by later stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    /// Document identifiers in row order, shared by every table below.
    pub ids: Vec<String>,
    pub feature_names: Vec<String>,
    pub zscores: FeatureMatrix,
    /// Signed-log of the z-scores; the matrix every subspace was fitted on.
    pub transformed: FeatureMatrix,
    pub scaling: FeatureScaling,
    pub metadata: Metadata,
    /// One grouping per analysed level, in analysis order.
    pub groupings: Vec<CategoryGrouping>,
    /// Parallel to `groupings`.
    pub render_configs: Vec<RenderConfig>,
    pub pca: Subspace,
    /// Orthonormalized LDA bases, parallel to `groupings`.
    pub lda: Vec<Subspace>,
    /// LDA bases truncated to a common dimensionality and matched to the first level.
    pub aligned_lda: Vec<Subspace>,
    pub config: AnalysisConfig,
}

impl AnalysisBundle {
    /// Saves the bundle with bincode.
    ///
    /// # Errors
    /// Any inconsistency reported by `validate`, `Io` for file errors and
    /// `Serialization` if encoding fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| AnalysisError::Serialization(format!("Failed to serialize analysis bundle: {}", e)))?;
        writer.flush()?;
        info!("Saved analysis bundle to {:?}.", path.as_ref());
        Ok(())
    }

    /// Loads a bundle written by `save` and checks that it is internally consistent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let bundle: AnalysisBundle =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| {
                    AnalysisError::Serialization(format!("Failed to deserialize analysis bundle: {}", e))
                })?;
        bundle.validate()?;
        info!(
            "Loaded analysis bundle from {:?}: {} documents, {} features.",
            path.as_ref(),
            bundle.ids.len(),
            bundle.feature_names.len()
        );
        Ok(bundle)
    }

    /// Checks that every table shares the same identifiers and features and
    /// that all subspaces live in the bundle's feature space.
    pub fn validate(&self) -> Result<()> {
        self.zscores.check_shape()?;
        self.transformed.check_shape()?;
        for grouping in &self.groupings {
            grouping.check_shape()?;
        }
        for subspace in std::iter::once(&self.pca).chain(&self.lda).chain(&self.aligned_lda) {
            subspace.check_shape()?;
        }
        for (name, matrix) in [("z-score", &self.zscores), ("transformed", &self.transformed)] {
            if matrix.ids() != self.ids.as_slice() {
                return Err(AnalysisError::ShapeMismatch(format!(
                    "{} matrix identifiers differ from the bundle identifiers",
                    name
                )));
            }
            if matrix.feature_names() != self.feature_names.as_slice() {
                return Err(AnalysisError::ShapeMismatch(format!(
                    "{} matrix features differ from the bundle features",
                    name
                )));
            }
        }
        if !self.metadata.ids().eq(self.ids.iter().map(String::as_str)) {
            return Err(AnalysisError::ShapeMismatch(
                "metadata identifiers differ from the bundle identifiers".to_owned(),
            ));
        }
        let n_features = self.feature_names.len();
        if self.scaling.mean.len() != n_features || self.scaling.scale.len() != n_features {
            return Err(AnalysisError::FeatureDimensionMismatch {
                left: self.scaling.mean.len(),
                right: n_features,
            });
        }
        if let Some(bad) = self.scaling.scale.iter().find(|&&v| !(v.is_finite() && v > 0.0)) {
            return Err(AnalysisError::InvalidParameter(format!(
                "feature scales must be finite and positive, found {}",
                bad
            )));
        }
        if self.scaling.mean.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidParameter(
                "feature means must be finite".to_owned(),
            ));
        }

        if self.render_configs.len() != self.groupings.len() || self.lda.len() != self.groupings.len()
        {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} groupings, {} render configs, {} LDA bases",
                self.groupings.len(),
                self.render_configs.len(),
                self.lda.len()
            )));
        }
        if !self.aligned_lda.is_empty() && self.aligned_lda.len() != self.lda.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} aligned LDA bases for {} levels",
                self.aligned_lda.len(),
                self.lda.len()
            )));
        }
        for (grouping, render) in self.groupings.iter().zip(&self.render_configs) {
            if grouping.n_documents() != self.ids.len() {
                return Err(AnalysisError::ShapeMismatch(format!(
                    "grouping '{}' covers {} documents, bundle has {}",
                    grouping.level(),
                    grouping.n_documents(),
                    self.ids.len()
                )));
            }
            if render.level != grouping.level() || render.order != grouping.classes() {
                return Err(AnalysisError::ShapeMismatch(format!(
                    "render config for '{}' does not match grouping '{}'",
                    render.level,
                    grouping.level()
                )));
            }
        }
        for subspace in std::iter::once(&self.pca).chain(&self.lda).chain(&self.aligned_lda) {
            if subspace.feature_names() != self.feature_names.as_slice() {
                return Err(AnalysisError::ShapeMismatch(
                    "subspace features differ from the bundle features".to_owned(),
                ));
            }
        }
        Ok(())
    }
}
