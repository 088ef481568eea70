//! Object publishing
//!
//! Stores document bytes under a deterministic key and hands back a stable,
//! shareable reference. Keys are derived from the configured client and the
//! content fingerprint, never from the original filename, so re-publishing
//! the same content is a no-op lookup instead of a collision.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use exporter_common::Fingerprint;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod config;

pub use config::StorageConfig;

/// Stable, shareable handle to an uploaded document. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedReference {
    /// Object key inside the bucket.
    pub key: String,
    /// Shareable URL for the object.
    pub url: String,
    /// When the shareable URL stops working; `None` for public-style URLs.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Why an object could not be published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishFailure {
    #[error("AuthFailure: {0}")]
    AuthFailure(String),

    #[error("QuotaExceeded: {0}")]
    QuotaExceeded(String),

    #[error("TransientStorageError: {0}")]
    TransientStorageError(String),
}

/// Boundary for durable object storage. Both operations are idempotent.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Store `bytes` under `key` and return a shareable reference. Either
    /// the object ends up fully present and addressable, or nothing is
    /// written.
    async fn publish(&self, key: &str, bytes: Vec<u8>) -> Result<PublishedReference, PublishFailure>;

    /// Reference for an object that is already present.
    async fn reference_for(&self, key: &str) -> Result<PublishedReference, PublishFailure>;
}

/// Deterministic key for a published document.
pub fn document_key(prefix: &str, client: &str, fingerprint: &Fingerprint) -> String {
    format!("{}/{}/{}.pdf", prefix, client, fingerprint.as_hex())
}

/// Key for the finished output artifact.
pub fn artifact_key(prefix: &str, client: &str, filename: &str) -> String {
    format!("{}/{}/processed/{}", prefix, client, filename)
}

/// S3-compatible publisher.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
    url_expiry: Duration,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> anyhow::Result<Self> {
        debug!(bucket = %config.bucket, region = %config.region, "Initializing storage client");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "expense-exporter",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
            endpoint: config.endpoint,
            url_expiry: Duration::from_secs(config.url_expiry_secs),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, PublishFailure> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                if message.contains("NotFound") || message.contains("404") {
                    Ok(false)
                } else {
                    Err(classify_storage_error(&message))
                }
            }
        }
    }

    /// Presigned URL for the object; falls back to a public-style URL with
    /// no expiry when presigning fails.
    async fn shareable_reference(&self, key: &str) -> PublishedReference {
        let presigning = PresigningConfig::expires_in(self.url_expiry);

        let presigned = match presigning {
            Ok(presigning) => {
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(presigning)
                    .await
                    .map(|request| request.uri().to_string())
                    .ok()
            }
            Err(_) => None,
        };

        match presigned {
            Some(url) => PublishedReference {
                key: key.to_string(),
                url,
                expires_at: Some(Utc::now() + ChronoDuration::seconds(self.url_expiry.as_secs() as i64)),
            },
            None => {
                let url = self.public_url(key);
                warn!(key, "Presigning failed, using public-style URL");
                PublishedReference {
                    key: key.to_string(),
                    url,
                    expires_at: None,
                }
            }
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

#[async_trait]
impl Publisher for Storage {
    async fn publish(&self, key: &str, bytes: Vec<u8>) -> Result<PublishedReference, PublishFailure> {
        // Re-publication of an existing key is a lookup, not an upload.
        if self.exists(key).await? {
            debug!(key, "Object already present, reusing");
            return self.reference_for(key).await;
        }

        let size = bytes.len();
        debug!(key, size, "Uploading to s3://{}/{}", self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type_for(key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| classify_storage_error(&e.to_string()))?;

        info!(key, size, "Uploaded to s3://{}/{}", self.bucket, key);

        Ok(self.shareable_reference(key).await)
    }

    async fn reference_for(&self, key: &str) -> Result<PublishedReference, PublishFailure> {
        Ok(self.shareable_reference(key).await)
    }
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("csv") => "text/csv",
        _ => "application/pdf",
    }
}

fn classify_storage_error(message: &str) -> PublishFailure {
    if message.contains("AccessDenied")
        || message.contains("InvalidAccessKeyId")
        || message.contains("SignatureDoesNotMatch")
        || message.contains("credentials")
    {
        PublishFailure::AuthFailure(message.to_string())
    } else if message.contains("QuotaExceeded") || message.contains("storage limit") {
        PublishFailure::QuotaExceeded(message.to_string())
    } else {
        PublishFailure::TransientStorageError(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_is_fingerprint_derived() {
        let fingerprint = Fingerprint::of_bytes(b"invoice bytes");
        let key = document_key("tmc-portal", "acme-travel", &fingerprint);
        assert_eq!(
            key,
            format!("tmc-portal/acme-travel/{}.pdf", fingerprint.as_hex())
        );
    }

    #[test]
    fn test_document_key_ignores_filename() {
        // Same content published under two different source names collides
        // on purpose: the key depends only on client and fingerprint.
        let fingerprint = Fingerprint::of_bytes(b"same bytes");
        let a = document_key("tmc-portal", "acme", &fingerprint);
        let b = document_key("tmc-portal", "acme", &fingerprint);
        assert_eq!(a, b);
    }

    #[test]
    fn test_artifact_key() {
        assert_eq!(
            artifact_key("tmc-portal", "acme", "invoices_out.csv"),
            "tmc-portal/acme/processed/invoices_out.csv"
        );
    }

    #[test]
    fn test_content_type_follows_extension() {
        assert_eq!(content_type_for("tmc-portal/acme/abc.pdf"), "application/pdf");
        assert_eq!(
            content_type_for("tmc-portal/acme/processed/out.csv"),
            "text/csv"
        );
    }

    #[test]
    fn test_classify_storage_error() {
        assert!(matches!(
            classify_storage_error("AccessDenied: not allowed"),
            PublishFailure::AuthFailure(_)
        ));
        assert!(matches!(
            classify_storage_error("QuotaExceeded for bucket"),
            PublishFailure::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_storage_error("connection reset by peer"),
            PublishFailure::TransientStorageError(_)
        ));
    }
}
