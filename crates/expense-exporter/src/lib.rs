//! Expense Exporter - hotel invoice document export pipeline
//!
//! Reads a spreadsheet of hotel-invoice records, resolves the document links
//! each row carries, downloads and content-deduplicates the documents,
//! publishes them to object storage, and records every processed link in two
//! independent ledgers before writing per-row outcomes back to an output
//! spreadsheet.
//!
//! # Architecture
//!
//! - [`sheet`] - spreadsheet reading/writing and row access
//! - [`expand`] - row-to-link-candidate expansion
//! - [`retrieve`] - document retrieval over HTTP
//! - [`storage`] - object publishing (S3-compatible)
//! - [`dedup`] - per-fingerprint publication claims and reuse
//! - [`ledger`] - the detail and summary ledgers
//! - [`pipeline`] - the per-link state machine, row orchestration, and the
//!   run controller
//! - [`config`] - environment-based configuration

pub mod config;
pub mod dedup;
pub mod expand;
pub mod ledger;
pub mod pipeline;
pub mod retrieve;
pub mod sheet;
pub mod storage;

pub use config::ExporterConfig;
pub use pipeline::{RunController, RunSummary};
