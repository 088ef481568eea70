//! Postgres-backed detail ledger
//!
//! Stores the full row context as a JSONB document alongside the
//! fingerprint and published reference. The fingerprint index is what makes
//! cross-run duplicate suppression possible.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exporter_common::Fingerprint;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DetailLedger, DetailRecord, LedgerFailure, RecordIdentity};
use crate::storage::PublishedReference;

pub struct PgDetailLedger {
    pool: PgPool,
}

impl PgDetailLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to the detail ledger database")?;

        sqlx::migrate!("migrations/detail")
            .run(&pool)
            .await
            .context("Failed to migrate the detail ledger schema")?;

        info!("Connected to the detail ledger");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DetailLedger for PgDetailLedger {
    async fn insert(&self, record: &DetailRecord) -> Result<RecordIdentity, LedgerFailure> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_documents
                (client, source, source_url, row_context, file_hash,
                 object_key, file_url, url_expires_at, status, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&record.client)
        .bind(&record.source)
        .bind(&record.source_url)
        .bind(&record.row_context)
        .bind(record.fingerprint.as_hex())
        .bind(&record.reference.key)
        .bind(&record.reference.url)
        .bind(record.reference.expires_at)
        .bind(&record.status)
        .bind(record.processed_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(id = %id, fingerprint = record.fingerprint.short(), "Inserted detail record");

        Ok(id)
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<PublishedReference>, LedgerFailure> {
        let row: Option<(String, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT object_key, file_url, url_expires_at
            FROM invoice_documents
            WHERE file_hash = $1
            ORDER BY processed_at DESC
            LIMIT 1
            "#,
        )
        .bind(fingerprint.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(key, url, expires_at)| PublishedReference {
            key,
            url,
            expires_at,
        }))
    }
}
