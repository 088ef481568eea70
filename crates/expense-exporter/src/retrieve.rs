//! Document retrieval
//!
//! Turns a link into raw bytes or a typed failure. Single attempt per link;
//! a failure is terminal for that candidate and never aborts its siblings.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Why a document could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalFailure {
    /// Network-level failure: DNS, connect, or timeout.
    #[error("UnreachableSource: {0}")]
    UnreachableSource(String),

    /// The source answered with a 4xx status.
    #[error("ClientError: status {0}")]
    ClientError(u16),

    /// The source answered with a 5xx status.
    #[error("ServerError: status {0}")]
    ServerError(u16),

    /// The source answered but the payload is not a document.
    #[error("MalformedResponse: {0}")]
    MalformedResponse(String),
}

/// Boundary for fetching a document by URL.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, url: &str) -> Result<Vec<u8>, RetrievalFailure>;
}

/// HTTP retriever. Redirects are followed; the final payload is returned.
pub struct HttpRetriever {
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, url: &str) -> Result<Vec<u8>, RetrievalFailure> {
        debug!(url, "Retrieving document");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrievalFailure::UnreachableSource(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(RetrievalFailure::ClientError(status.as_u16()));
        }
        if status.is_server_error() {
            return Err(RetrievalFailure::ServerError(status.as_u16()));
        }

        // An HTML payload in place of a document is how these sources report
        // expired or broken temporary links.
        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if content_type.starts_with("text/html") {
                return Err(RetrievalFailure::MalformedResponse(format!(
                    "expected a document, got {content_type}"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RetrievalFailure::MalformedResponse(e.to_string()))?;

        debug!(url, size = bytes.len(), "Retrieved document");

        Ok(bytes.to_vec())
    }
}
