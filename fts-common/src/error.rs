//! Common error types for FTS

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for FTS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the FTS crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write error (wraps csv::Error)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response directory is missing or holds no CSV files at all.
    ///
    /// Distinct from a successful load that is empty after mode filtering.
    #[error("No response data found in {}", .0.display())]
    NoData(PathBuf),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
