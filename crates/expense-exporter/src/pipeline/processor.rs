//! Per-link processing
//!
//! Drives one candidate through retrieve -> fingerprint -> publish/reuse ->
//! record, producing a terminal outcome. Candidates are independent: a
//! failure here never halts sibling candidates of the same row.

use chrono::Utc;
use exporter_common::Fingerprint;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dedup::{FingerprintStore, Publication};
use crate::expand::LinkCandidate;
use crate::ledger::{
    DetailLedger, DetailRecord, InvoiceMetadata, SummaryLedger, SummaryRecord,
};
use crate::retrieve::Retriever;
use crate::sheet::InputRow;
use crate::storage::{document_key, PublishedReference, Publisher};

use super::types::{CompletedLink, LinkFailure, LinkOutcome, LinkStage, LinkStatus};

/// Detail records are written once the document is safely published.
const DETAIL_STATUS: &str = "SUCCESS";
/// Summary records start out awaiting downstream reconciliation.
const SUMMARY_STATUS: &str = "PENDING";

/// Run-wide identifiers threaded into keys and ledger records.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    pub client: String,
    pub source: String,
    pub key_prefix: String,
}

/// Orchestrates the collaborators for one candidate at a time.
pub struct LinkProcessor {
    retriever: Arc<dyn Retriever>,
    publisher: Arc<dyn Publisher>,
    fingerprints: Arc<FingerprintStore>,
    detail: Arc<dyn DetailLedger>,
    summary: Arc<dyn SummaryLedger>,
    context: ProcessorContext,
}

impl LinkProcessor {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        publisher: Arc<dyn Publisher>,
        fingerprints: Arc<FingerprintStore>,
        detail: Arc<dyn DetailLedger>,
        summary: Arc<dyn SummaryLedger>,
        context: ProcessorContext,
    ) -> Self {
        Self {
            retriever,
            publisher,
            fingerprints,
            detail,
            summary,
            context,
        }
    }

    /// Process one candidate to a terminal state.
    pub async fn process(&self, row: &InputRow, candidate: LinkCandidate) -> LinkOutcome {
        let status = match self.run(row, &candidate).await {
            Ok(link) => {
                info!(
                    row = candidate.row_index + 1,
                    link = candidate.link_index + 1,
                    fingerprint = link.fingerprint.short(),
                    reused = link.reused,
                    "Link processed"
                );
                LinkStatus::Completed(link)
            }
            Err((stage, failure)) => {
                warn!(
                    row = candidate.row_index + 1,
                    link = candidate.link_index + 1,
                    url = %candidate.url,
                    stage = stage.as_str(),
                    %failure,
                    "Link failed"
                );
                LinkStatus::Failed { stage, failure }
            }
        };

        LinkOutcome {
            link_index: candidate.link_index,
            raw: candidate.raw.clone(),
            url: candidate.url.clone(),
            status,
        }
    }

    async fn run(
        &self,
        row: &InputRow,
        candidate: &LinkCandidate,
    ) -> Result<CompletedLink, (LinkStage, LinkFailure)> {
        // Pending -> Retrieved
        let bytes = self
            .retriever
            .retrieve(&candidate.url)
            .await
            .map_err(|e| (LinkStage::Retrieve, e.into()))?;

        // Retrieved -> Fingerprinted
        if bytes.is_empty() {
            return Err((LinkStage::Fingerprint, LinkFailure::EmptyDocument));
        }
        let fingerprint = Fingerprint::of_bytes(&bytes);

        // Fingerprinted -> Published | Reused
        let (reference, reused) = self.publish_or_reuse(&fingerprint, bytes).await?;

        // Published | Reused -> Recorded. A summary failure after the detail
        // insert succeeded leaves the detail record in place; there is no
        // compensating delete.
        let detail_record = DetailRecord {
            client: self.context.client.clone(),
            source: self.context.source.clone(),
            source_url: candidate.url.clone(),
            row_context: row.context_json(),
            fingerprint: fingerprint.clone(),
            reference: reference.clone(),
            status: DETAIL_STATUS.to_string(),
            processed_at: Utc::now(),
        };
        let detail_id = self
            .detail
            .insert(&detail_record)
            .await
            .map_err(|e| (LinkStage::Detail, e.into()))?;

        let summary_record = SummaryRecord {
            source: self.context.source.clone(),
            detail_id,
            client_name: self.context.client.clone(),
            file_url: reference.url.clone(),
            fingerprint: fingerprint.clone(),
            status: SUMMARY_STATUS.to_string(),
            invoice: InvoiceMetadata::from_row(row),
            remarks: Some(format!("Processed from {}", self.context.client)),
        };
        let summary_id = self
            .summary
            .insert(&summary_record)
            .await
            .map_err(|e| (LinkStage::Summary, e.into()))?;

        // Recorded -> Completed
        Ok(CompletedLink {
            fingerprint,
            reference,
            detail_id,
            summary_id,
            reused,
        })
    }

    /// At most one upload per fingerprint per run: the claim holder uploads,
    /// everyone else reuses the recorded reference.
    async fn publish_or_reuse(
        &self,
        fingerprint: &Fingerprint,
        bytes: Vec<u8>,
    ) -> Result<(PublishedReference, bool), (LinkStage, LinkFailure)> {
        match self
            .fingerprints
            .acquire(fingerprint)
            .await
            .map_err(|e| (LinkStage::Detail, e.into()))?
        {
            Publication::Reused(reference) => {
                debug!(fingerprint = fingerprint.short(), "Reusing published content");
                Ok((reference, true))
            }
            Publication::Claimed => {
                let key = document_key(&self.context.key_prefix, &self.context.client, fingerprint);
                match self.publisher.publish(&key, bytes).await {
                    Ok(reference) => {
                        self.fingerprints.complete(fingerprint, reference.clone()).await;
                        Ok((reference, false))
                    }
                    Err(failure) => {
                        self.fingerprints.release(fingerprint).await;
                        Err((LinkStage::Publish, failure.into()))
                    }
                }
            }
        }
    }
}
