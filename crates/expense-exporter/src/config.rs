//! Configuration management
//!
//! Everything is environment-driven (with `.env` support); the full
//! configuration is validated before the run controller starts so a missing
//! required value fails at startup rather than mid-run.

use anyhow::Context;
use std::path::PathBuf;
use url::Url;

use crate::expand::DEFAULT_LINK_DELIMITERS;
use crate::storage::StorageConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default link-bearing column in the input artifact.
pub const DEFAULT_LINK_FIELD: &str = "HOTEL_INVOICE_PATH";

/// Default source identifier recorded on every ledger entry.
pub const DEFAULT_SOURCE: &str = "tmc-portal";

/// Default per-row candidate concurrency (sequential).
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Exporter configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Input artifact location.
    pub input_path: PathBuf,
    /// Output artifact location.
    pub output_path: PathBuf,
    /// Column holding the document links.
    pub link_field: String,
    /// Characters that separate multiple links within one cell.
    pub link_delimiters: String,
    /// Base URL for links that are not absolute.
    pub link_base_url: Option<Url>,
    /// Client identifier.
    pub client: String,
    /// Source identifier.
    pub source: String,
    /// Per-row candidate concurrency bound.
    pub concurrency: usize,
    /// Publish the finished output artifact to object storage.
    pub upload_output: bool,
    /// Detail ledger database.
    pub detail_database_url: String,
    /// Summary ledger database.
    pub summary_database_url: String,
    /// Object storage.
    pub storage: StorageConfig,
}

impl ExporterConfig {
    /// Load configuration from environment and defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = ExporterConfig {
            input_path: std::env::var("EXPORTER_INPUT")
                .map(PathBuf::from)
                .context("EXPORTER_INPUT must be set to the input artifact path")?,
            output_path: std::env::var("EXPORTER_OUTPUT")
                .map(PathBuf::from)
                .context("EXPORTER_OUTPUT must be set to the output artifact path")?,
            link_field: std::env::var("EXPORTER_LINK_FIELD")
                .unwrap_or_else(|_| DEFAULT_LINK_FIELD.to_string()),
            link_delimiters: std::env::var("EXPORTER_LINK_DELIMITERS")
                .unwrap_or_else(|_| DEFAULT_LINK_DELIMITERS.to_string()),
            link_base_url: match std::env::var("EXPORTER_LINK_BASE_URL") {
                Ok(base) => Some(
                    Url::parse(&base).context("EXPORTER_LINK_BASE_URL is not a valid URL")?,
                ),
                Err(_) => None,
            },
            client: std::env::var("EXPORTER_CLIENT")
                .context("EXPORTER_CLIENT must be set to the client identifier")?,
            source: std::env::var("EXPORTER_SOURCE")
                .unwrap_or_else(|_| DEFAULT_SOURCE.to_string()),
            concurrency: std::env::var("EXPORTER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONCURRENCY),
            upload_output: std::env::var("EXPORTER_UPLOAD_OUTPUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            detail_database_url: std::env::var("DETAIL_DATABASE_URL")
                .context("DETAIL_DATABASE_URL must be set")?,
            summary_database_url: std::env::var("SUMMARY_DATABASE_URL")
                .context("SUMMARY_DATABASE_URL must be set")?,
            storage: StorageConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client.trim().is_empty() {
            anyhow::bail!("Client identifier cannot be empty");
        }

        if self.link_field.trim().is_empty() {
            anyhow::bail!("Link field cannot be empty");
        }

        if self.link_delimiters.is_empty() {
            anyhow::bail!("Link delimiter set cannot be empty");
        }

        if self.concurrency == 0 {
            anyhow::bail!("Concurrency must be greater than 0");
        }

        if self.input_path.as_os_str().is_empty() || self.output_path.as_os_str().is_empty() {
            anyhow::bail!("Input and output artifact paths cannot be empty");
        }

        if self.input_path == self.output_path {
            anyhow::bail!(
                "Input and output artifacts must be different files ({})",
                self.input_path.display()
            );
        }

        if self.storage.bucket.trim().is_empty() {
            anyhow::bail!("Storage bucket cannot be empty");
        }

        if self.detail_database_url.trim().is_empty() || self.summary_database_url.trim().is_empty()
        {
            anyhow::bail!("Both ledger database URLs must be set");
        }

        Ok(())
    }
}
