//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the exporter
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExporterError {
    /// Wrap a CSV-layer failure as a fatal artifact error.
    pub fn artifact(context: impl std::fmt::Display, source: impl std::fmt::Display) -> Self {
        ExporterError::Artifact(format!("{context}: {source}"))
    }
}
