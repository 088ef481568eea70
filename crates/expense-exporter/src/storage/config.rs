use serde::{Deserialize, Serialize};
use std::env;

/// Default presigned-URL lifetime: six days.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 518_400;

/// Default key prefix for published documents.
pub const DEFAULT_KEY_PREFIX: &str = "tmc-portal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Leading path segment of every published object key.
    pub key_prefix: String,
    /// Lifetime of generated shareable URLs, in seconds.
    pub url_expiry_secs: u64,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "expense-exporter".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            key_prefix: env::var("S3_KEY_PREFIX").unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
            url_expiry_secs: env::var("S3_URL_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_URL_EXPIRY_SECS),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            url_expiry_secs: DEFAULT_URL_EXPIRY_SECS,
        }
    }
}
