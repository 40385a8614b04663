//! Error types for the analytics pipeline.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the analytics pipeline and its I/O shims.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Date parsing error at row {row}: could not parse '{value}' as month/day/year")]
    DateParse { row: usize, value: String },

    #[error("Numeric parsing error at row {row}: field '{field}' has invalid value '{value}'")]
    NumericParse {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("Input contains no data rows")]
    EmptyInput,

    #[error("Division by zero: first closing price is 0, performance change is undefined")]
    DivisionByZero,

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No file provided")]
    EmptyUpload,

    #[error("Processing exceeded the {0:?} time limit")]
    Timeout(Duration),

    #[error("Analysis worker stopped without a result")]
    WorkerLost,
}

impl AnalysisError {
    /// Whether the error means the input file itself was rejected.
    ///
    /// Rejections are terminal for the file and never worth retrying; the
    /// remaining kinds come from the environment (storage, encoding, config).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AnalysisError::Schema(_)
                | AnalysisError::DateParse { .. }
                | AnalysisError::NumericParse { .. }
                | AnalysisError::EmptyInput
                | AnalysisError::DivisionByZero
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
