//! Content fingerprints for duplicate detection
//!
//! A fingerprint is the lowercase-hex SHA-256 digest of a document's raw
//! bytes. Identical bytes always produce the same fingerprint, which makes it
//! usable both as the duplicate-suppression key and as the join value shared
//! by the two ledgers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;

use crate::error::Result;

/// Content-derived digest of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an in-memory document.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Compute the fingerprint of any readable source.
    pub fn of_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }

    /// Reconstruct a fingerprint from a stored hex digest.
    pub fn from_hex(digest: impl Into<String>) -> Self {
        Fingerprint(digest.into().to_lowercase())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Leading digest characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
