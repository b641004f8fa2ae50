//! Error types for RFM derivation and its supporting layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RfmError {
    /// A required field is absent, null, non-numeric or not finite.
    #[error("Invalid input in field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// Too few records (or too few distinct values) to form four quartile bins.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid RFM score '{0}': expected three digits in 1..=4")]
    InvalidScore(String),

    #[error("Invalid column selector: {0}")]
    InvalidSelector(String),

    #[error("Data frame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl RfmError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for library operations.
pub type RfmResult<T> = std::result::Result<T, RfmError>;
