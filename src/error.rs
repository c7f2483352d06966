use thiserror::Error;

use crate::schema::StatementType;

/// Raised when every parse strategy fails on a model response.
///
/// Carries the cleaned payload so the caller can log it for diagnosis.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unparsable model response after {attempts} strategies: {reason}")]
pub struct ParseError {
    pub attempts: usize,
    pub reason: String,
    pub payload: String,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to open document {path}: {reason}")]
    DocumentOpen { path: String, reason: String },

    #[error("Model service error: {0}")]
    ModelService(String),

    #[error("Model response for {statement} (page {page}) could not be parsed: {source}")]
    Parse {
        statement: StatementType,
        page: usize,
        #[source]
        source: ParseError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid table layout: {0}")]
    InvalidTable(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
