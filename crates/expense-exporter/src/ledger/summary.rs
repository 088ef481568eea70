//! Postgres-backed summary ledger
//!
//! Holds the normalized `hotel_invoice` rows downstream reconciliation reads
//! from. Insertion deduplicates by fingerprint: content already present gets
//! its `updated_on` refreshed and keeps its identity instead of producing a
//! second row.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{LedgerFailure, RecordIdentity, SummaryLedger, SummaryRecord};

pub struct PgSummaryLedger {
    pool: PgPool,
}

impl PgSummaryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to the summary ledger database")?;

        sqlx::migrate!("migrations/summary")
            .run(&pool)
            .await
            .context("Failed to migrate the summary ledger schema")?;

        info!("Connected to the summary ledger");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SummaryLedger for PgSummaryLedger {
    async fn insert(&self, record: &SummaryRecord) -> Result<RecordIdentity, LedgerFailure> {
        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM hotel_invoice WHERE file_hash = $1")
                .bind(record.fingerprint.as_hex())
                .fetch_optional(&self.pool)
                .await?;

        if let Some(id) = existing {
            sqlx::query("UPDATE hotel_invoice SET updated_on = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            debug!(id = %id, fingerprint = record.fingerprint.short(), "Duplicate content, refreshed updated_on");

            return Ok(id);
        }

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO hotel_invoice
                (source, source_id, client_name, file_url, file_hash, status,
                 booking_id, client_gstin, hotel_gstin, invoice_number,
                 invoice_date, gst_amount, remarks, updated_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            RETURNING id
            "#,
        )
        .bind(&record.source)
        .bind(record.detail_id.to_string())
        .bind(&record.client_name)
        .bind(&record.file_url)
        .bind(record.fingerprint.as_hex())
        .bind(&record.status)
        .bind(&record.invoice.booking_id)
        .bind(&record.invoice.client_gstin)
        .bind(&record.invoice.hotel_gstin)
        .bind(&record.invoice.invoice_number)
        .bind(record.invoice.invoice_date)
        .bind(record.invoice.gst_amount)
        .bind(&record.remarks)
        .fetch_one(&self.pool)
        .await?;

        debug!(id = %id, fingerprint = record.fingerprint.short(), "Inserted summary record");

        Ok(id)
    }
}
