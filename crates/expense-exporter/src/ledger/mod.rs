//! The two ledgers
//!
//! Every processed link is recorded twice: a detail record carrying the full
//! row context in one datastore, and a normalized summary record in another.
//! The only linkage between them is the detail record's assigned identity
//! stored on the summary side; it is never validated as a foreign key. The
//! two stores share no transaction - each insertion is its own unit of work.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use exporter_common::Fingerprint;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::sheet::InputRow;
use crate::storage::PublishedReference;

pub mod detail;
pub mod summary;

pub use detail::PgDetailLedger;
pub use summary::PgSummaryLedger;

/// Datastore-assigned identity of a ledger record.
pub type RecordIdentity = Uuid;

/// A ledger insertion or lookup failed. Link-scoped; terminates only the
/// owning candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("LedgerFailure: {message}")]
pub struct LedgerFailure {
    pub message: String,
}

impl LedgerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for LedgerFailure {
    fn from(e: sqlx::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// One record per processed link, keyed by fingerprint, carrying the full
/// row context. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct DetailRecord {
    pub client: String,
    pub source: String,
    pub source_url: String,
    pub row_context: serde_json::Value,
    pub fingerprint: Fingerprint,
    pub reference: PublishedReference,
    pub status: String,
    pub processed_at: DateTime<Utc>,
}

/// Normalized invoice fields extracted from the spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceMetadata {
    pub booking_id: Option<String>,
    pub client_gstin: Option<String>,
    pub hotel_gstin: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub gst_amount: Option<f64>,
}

const COL_BOOKING_ID: &str = "BOOKING_ID";
const COL_CLIENT_GSTIN: &str = "CLIENT_GST_NO";
const COL_HOTEL_GSTIN: &str = "HOTEL_GST_NUMBER";
const COL_INVOICE_NUMBER: &str = "Q2T_INVOICE_NO";
const COL_INVOICE_DATE: &str = "HOTEL_INVOICE_DATE";
const COL_GST_AMOUNT: &str = "TOTAL INVOICE AMOUNT";

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

impl InvoiceMetadata {
    /// Extract the mapped columns from a row. Extraction is lenient: a
    /// missing column or an unparseable date/amount leaves the field unset
    /// rather than failing the link.
    pub fn from_row(row: &InputRow) -> Self {
        Self {
            booking_id: non_empty(row.get(COL_BOOKING_ID)),
            client_gstin: non_empty(row.get(COL_CLIENT_GSTIN)),
            hotel_gstin: non_empty(row.get(COL_HOTEL_GSTIN)),
            invoice_number: non_empty(row.get(COL_INVOICE_NUMBER)),
            invoice_date: non_empty(row.get(COL_INVOICE_DATE)).and_then(|d| parse_date(&d)),
            gst_amount: non_empty(row.get(COL_GST_AMOUNT)).and_then(|a| parse_amount(&a)),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

fn parse_amount(value: &str) -> Option<f64> {
    value.replace(',', "").parse().ok()
}

/// One normalized record per processed link, carrying a back-reference to
/// the detail record's assigned identity.
#[derive(Debug, Clone)]
pub struct SummaryRecord {
    pub source: String,
    /// The detail record this summary row refers to. Unenforced.
    pub detail_id: RecordIdentity,
    pub client_name: String,
    pub file_url: String,
    pub fingerprint: Fingerprint,
    pub status: String,
    pub invoice: InvoiceMetadata,
    pub remarks: Option<String>,
}

/// Append target for detail records, plus the fingerprint lookup that makes
/// duplicate suppression survive process restarts.
#[async_trait]
pub trait DetailLedger: Send + Sync {
    async fn insert(&self, record: &DetailRecord) -> Result<RecordIdentity, LedgerFailure>;

    /// Most recent published reference for a fingerprint, if this content
    /// was ever recorded before (this run or a prior one).
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<PublishedReference>, LedgerFailure>;
}

/// Append target for summary records.
#[async_trait]
pub trait SummaryLedger: Send + Sync {
    async fn insert(&self, record: &SummaryRecord) -> Result<RecordIdentity, LedgerFailure>;
}
