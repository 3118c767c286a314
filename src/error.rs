// src/error.rs

use thiserror::Error;

/// Errors raised anywhere in the analysis pipeline.
///
/// Variants fall into two fatal families, data-integrity problems and
/// dimensionality violations, plus a handful of parameter, numeric and I/O
/// failures. Degenerate-but-valid inputs (near-constant features, tiny classes)
/// are logged as warnings instead and never show up here.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Duplicate document identifiers in {table} table: {}", preview(.ids))]
    DuplicateIds { table: &'static str, ids: Vec<String> },

    #[error("Duplicate feature names: {}", preview(.names))]
    DuplicateFeatures { names: Vec<String> },

    #[error("Feature rows have no metadata record: {}", preview(.ids))]
    MissingMetadata { ids: Vec<String> },

    #[error("Non-finite values reached a numeric routine in rows: {}", preview(.rows))]
    NonFinite { rows: Vec<String> },

    #[error("Features with zero variance must be excluded before standardization: {}", preview(.features))]
    ZeroVariance { features: Vec<String> },

    #[error("Document '{id}' has category code '{code}' which is not listed for level '{level}'")]
    UnknownCategory { id: String, level: String, code: String },

    #[error("Document '{id}' has no category at level '{level}'")]
    MissingCategoryLevel { id: String, level: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("{method} supports at most {bound} dimensions here, but {requested} were requested")]
    DimensionBound {
        method: &'static str,
        requested: usize,
        bound: usize,
    },

    #[error("Feature dimensionality differs: {left} vs {right}")]
    FeatureDimensionMismatch { left: usize, right: usize },

    #[error("Number of basis dimensions differs: {left} vs {right}")]
    DimensionCountMismatch { left: usize, right: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Within-class scatter matrix is singular (smallest eigenvalue {smallest:e}); consider LdaConfig::shrinkage > 0")]
    SingularScatter { smallest: f64 },

    #[error("Matrix decomposition failed: {0}")]
    Decomposition(String),

    #[error("Failed to read or write bundle file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bundle serialization failed: {0}")]
    Serialization(String),
}

impl AnalysisError {
    /// True for identifier, label and value problems in the input tables.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            AnalysisError::DuplicateIds { .. }
                | AnalysisError::DuplicateFeatures { .. }
                | AnalysisError::MissingMetadata { .. }
                | AnalysisError::NonFinite { .. }
                | AnalysisError::ZeroVariance { .. }
                | AnalysisError::UnknownCategory { .. }
                | AnalysisError::MissingCategoryLevel { .. }
                | AnalysisError::ShapeMismatch(_)
        )
    }

    /// True when a requested dimensionality violates a mathematical bound or
    /// two bases/matrices disagree in shape.
    pub fn is_dimensionality(&self) -> bool {
        matches!(
            self,
            AnalysisError::DimensionBound { .. }
                | AnalysisError::FeatureDimensionMismatch { .. }
                | AnalysisError::DimensionCountMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

const PREVIEW_LIMIT: usize = 5;

fn preview(items: &[String]) -> String {
    if items.len() <= PREVIEW_LIMIT {
        items.join(", ")
    } else {
        format!(
            "{}, ... ({} total)",
            items[..PREVIEW_LIMIT].join(", "),
            items.len()
        )
    }
}
