#![doc = include_str!("../README.md")]

pub mod bundle;
pub mod dataset;
pub mod error;
pub mod lda;
pub mod linalg_backends;
pub mod pca;
pub mod pipeline;
pub mod report;
pub mod rotate;
pub mod similarity;
pub mod subspace;
pub mod taxonomy;
pub mod transform;


pub use bundle::AnalysisBundle;
pub use dataset::{align_tables, Corpus, DocumentMeta, FeatureMatrix, FilterReport, GroupKey, Metadata, SizeFilter};
pub use error::{AnalysisError, Result};
pub use lda::{fit_lda, CentroidClassifier, LdaConfig};
pub use pca::{explained_variance_ratio, fit_pca, PcaConfig, RANK_TOLERANCE};
pub use pipeline::{run_analysis, AnalysisConfig, AnalysisOutcome};
pub use report::{display_permutation, group_summaries, weight_table, RenderConfig};
pub use rotate::{match_to_reference, rotate_pair, MatchStrategy, MatchedSubspace};
pub use similarity::{compare_subspaces, SubspaceSimilarity};
pub use subspace::{Projection, Subspace, SubspaceKind, Which};
pub use taxonomy::{CategoryEntry, CategoryGrouping, CategoryTaxonomy};
pub use transform::{signed_log, signed_log_transform, standardize, FeatureScaling};
