// src/pipeline.rs

use crate::bundle::AnalysisBundle;
use crate::dataset::{align_tables, DocumentMeta, FeatureMatrix, FilterReport, SizeFilter};
use crate::error::{AnalysisError, Result};
use crate::lda::{fit_lda, LdaConfig};
use crate::pca::{fit_pca, PcaConfig};
use crate::report::RenderConfig;
use crate::rotate::{match_to_reference, MatchStrategy};
use crate::similarity::{compare_subspaces, SubspaceSimilarity};
use crate::taxonomy::CategoryTaxonomy;
use crate::transform::{signed_log_transform, standardize};
use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Everything `run_analysis` needs besides the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub filter: SizeFilter,
    /// Features whose standard deviation is at most this are dropped before standardizing.
    pub variance_tolerance: f64,
    /// Base of the signed-log transform applied to the z-scores.
    pub log_base: f64,
    pub pca: PcaConfig,
    pub lda: LdaConfig,
    /// Taxonomy levels to fit an LDA on, in order. The first one is the
    /// alignment reference. Empty means every level of the taxonomy.
    pub lda_levels: Vec<String>,
    pub match_strategy: MatchStrategy,
    /// Number of leading PCA dimensions each LDA is compared with.
    /// `None` uses as many as the LDA has.
    pub pca_comparison_dims: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            filter: SizeFilter::default(),
            variance_tolerance: 1e-12,
            log_base: std::f64::consts::E,
            pca: PcaConfig::default(),
            lda: LdaConfig::default(),
            lda_levels: Vec::new(),
            match_strategy: MatchStrategy::default(),
            pca_comparison_dims: None,
        }
    }
}

/// An LDA compared with the leading PCA dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcaComparison {
    pub level: String,
    pub pca_dims: usize,
    pub similarity: SubspaceSimilarity,
}

/// Two LDAs compared with each other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelComparison {
    pub first: String,
    pub second: String,
    pub similarity: SubspaceSimilarity,
}

/// How one level's aligned basis lines up with the reference level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelAlignment {
    pub level: String,
    pub assignment: Vec<usize>,
    pub flipped: Vec<bool>,
    pub cosines: Array1<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisOutcome {
    pub bundle: AnalysisBundle,
    pub filter_report: FilterReport,
    pub dropped_features: Vec<String>,
    pub alignments: Vec<LevelAlignment>,
    pub pca_comparisons: Vec<PcaComparison>,
    pub level_comparisons: Vec<LevelComparison>,
}

/// Runs the whole analysis on in-memory tables.
///
/// Stages: align tables, size filter, drop constant features, standardize,
/// signed-log, PCA, one LDA per level, orthonormalize each LDA, match every
/// LDA to the first one, then compare each LDA with the leading PCA
/// dimensions and with every other LDA.
///
/// Matching pairs the leading `m` dimensions of every level, where `m` is the
/// smallest LDA dimensionality among the levels; the bundle keeps both the
/// full orthonormalized bases and the aligned ones.
///
/// # Errors
/// Any error of the individual stages; `InvalidParameter` if no level is
/// configured or fewer than two documents survive filtering.
pub fn run_analysis(
    features: FeatureMatrix,
    metadata: Vec<DocumentMeta>,
    taxonomy: &CategoryTaxonomy,
    config: &AnalysisConfig,
) -> Result<AnalysisOutcome> {
    let levels: Vec<String> = if config.lda_levels.is_empty() {
        taxonomy.levels().map(str::to_owned).collect()
    } else {
        config.lda_levels.clone()
    };
    if levels.is_empty() {
        return Err(AnalysisError::InvalidParameter(
            "no category level to fit a discriminant analysis on".to_owned(),
        ));
    }

    let corpus = align_tables(features, metadata)?;
    let (filtered, filter_report) = corpus.filter_min_size(&config.filter);
    if filtered.len() < 2 {
        return Err(AnalysisError::InvalidParameter(format!(
            "only {} documents passed the size filter",
            filtered.len()
        )));
    }
    let (corpus, dropped_features) = filtered.drop_constant_features(config.variance_tolerance);

    let (zscores, scaling) = standardize(corpus.features())?;
    let transformed = signed_log_transform(&zscores, config.log_base)?;

    let pca = fit_pca(&transformed, &config.pca)?;

    let mut groupings = Vec::with_capacity(levels.len());
    let mut lda = Vec::with_capacity(levels.len());
    for level in &levels {
        let grouping = taxonomy.grouping(level, corpus.metadata())?;
        let fitted = fit_lda(&transformed, &grouping, &config.lda)?;
        lda.push(fitted.orthonormalized()?);
        groupings.push(grouping);
    }

    let common_dims = lda.iter().map(|s| s.n_dims()).min().unwrap_or(0);
    let reference = lda[0].leading(common_dims)?;
    let mut aligned_lda = Vec::with_capacity(lda.len());
    let mut alignments = Vec::with_capacity(lda.len());
    for (level, subspace) in levels.iter().zip(&lda) {
        let matched =
            match_to_reference(&subspace.leading(common_dims)?, &reference, config.match_strategy)?;
        info!(
            "Aligned LDA '{}' to '{}': mean |cosine| {:.3}.",
            level,
            levels[0],
            matched.cosines.mean().unwrap_or(0.0)
        );
        alignments.push(LevelAlignment {
            level: level.clone(),
            assignment: matched.assignment,
            flipped: matched.flipped,
            cosines: matched.cosines,
        });
        aligned_lda.push(matched.subspace);
    }

    let mut pca_comparisons = Vec::with_capacity(lda.len());
    for (level, subspace) in levels.iter().zip(&lda) {
        let pca_dims = config
            .pca_comparison_dims
            .unwrap_or(subspace.n_dims())
            .min(pca.n_dims());
        let similarity = compare_subspaces(subspace, &pca.leading(pca_dims)?)?;
        info!(
            "LDA '{}' vs first {} PCs: {:.2} shared dimensions, expected R² {:.3}.",
            level,
            pca_dims,
            similarity.shared_dimensions(),
            similarity.expected_r_squared()
        );
        pca_comparisons.push(PcaComparison {
            level: level.clone(),
            pca_dims,
            similarity,
        });
    }

    let mut level_comparisons = Vec::new();
    for a in 0..lda.len() {
        for b in (a + 1)..lda.len() {
            let similarity = compare_subspaces(&lda[a], &lda[b])?;
            info!(
                "LDA '{}' vs LDA '{}': {:.2} shared dimensions, expected R² {:.3}.",
                levels[a],
                levels[b],
                similarity.shared_dimensions(),
                similarity.expected_r_squared()
            );
            level_comparisons.push(LevelComparison {
                first: levels[a].clone(),
                second: levels[b].clone(),
                similarity,
            });
        }
    }

    let render_configs = groupings.iter().map(RenderConfig::for_grouping).collect();
    let bundle = AnalysisBundle {
        ids: corpus.ids().to_vec(),
        feature_names: corpus.features().feature_names().to_vec(),
        zscores,
        transformed,
        scaling,
        metadata: corpus.metadata().clone(),
        groupings,
        render_configs,
        pca,
        lda,
        aligned_lda,
        config: config.clone(),
    };
    bundle.validate()?;

    info!(
        "Analysis finished: {} documents, {} features, {} LDA level(s).",
        bundle.ids.len(),
        bundle.feature_names.len(),
        levels.len()
    );
    Ok(AnalysisOutcome {
        bundle,
        filter_report,
        dropped_features,
        alignments,
        pca_comparisons,
        level_comparisons,
    })
}
