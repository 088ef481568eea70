//! Expense Exporter Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the expense-exporter
//! workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Fingerprints**: Content-digest utilities for duplicate detection
//! - **Logging**: Centralized tracing configuration

pub mod error;
pub mod fingerprint;
pub mod logging;

// Re-export commonly used types
pub use error::{ExporterError, Result};
pub use fingerprint::Fingerprint;
