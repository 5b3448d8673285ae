//! Error types for jecfit

use thiserror::Error;

/// jecfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid run configuration (unknown labels, nothing to fit, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed textual specification
    #[error("Parse error: {0}")]
    Parse(String),

    /// Nuisance parameter that has not been declared
    #[error("Unknown nuisance parameter \"{0}\"")]
    UnknownName(String),

    /// Missing or inconsistent measurement input
    #[error("Input error: {0}")]
    Input(String),

    /// Violated API contract (length mismatches, invalid options)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
