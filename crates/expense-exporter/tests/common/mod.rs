//! In-memory collaborators for pipeline tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use expense_exporter::expand::RowExpander;
use expense_exporter::ledger::{
    DetailLedger, DetailRecord, LedgerFailure, RecordIdentity, SummaryLedger, SummaryRecord,
};
use expense_exporter::pipeline::{ProcessorContext, RunController, RunOptions};
use expense_exporter::retrieve::{RetrievalFailure, Retriever};
use expense_exporter::storage::{PublishFailure, PublishedReference, Publisher};
use exporter_common::Fingerprint;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Retriever with scripted per-URL responses and optional delays.
#[derive(Default)]
pub struct ScriptedRetriever {
    responses: HashMap<String, Result<Vec<u8>, RetrievalFailure>>,
    delays: HashMap<String, u64>,
}

impl ScriptedRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, url: &str, bytes: &[u8]) -> Self {
        self.responses.insert(url.to_string(), Ok(bytes.to_vec()));
        self
    }

    pub fn fail(mut self, url: &str, failure: RetrievalFailure) -> Self {
        self.responses.insert(url.to_string(), Err(failure));
        self
    }

    /// Delay this URL's response so completions finish out of order.
    pub fn delay_ms(mut self, url: &str, millis: u64) -> Self {
        self.delays.insert(url.to_string(), millis);
        self
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn retrieve(&self, url: &str) -> Result<Vec<u8>, RetrievalFailure> {
        if let Some(millis) = self.delays.get(url) {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
        match self.responses.get(url) {
            Some(response) => response.clone(),
            None => Err(RetrievalFailure::UnreachableSource(format!(
                "no scripted response for {url}"
            ))),
        }
    }
}

/// Publisher that stores objects in memory and counts actual uploads.
#[derive(Default)]
pub struct MemoryPublisher {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub uploads: Mutex<Vec<String>>,
    pub fail: Option<PublishFailure>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failure: PublishFailure) -> Self {
        Self {
            fail: Some(failure),
            ..Self::default()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    fn reference(key: &str) -> PublishedReference {
        PublishedReference {
            key: key.to_string(),
            url: format!("https://test-bucket.s3.amazonaws.com/{key}"),
            expires_at: None,
        }
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, key: &str, bytes: Vec<u8>) -> Result<PublishedReference, PublishFailure> {
        if let Some(failure) = &self.fail {
            return Err(failure.clone());
        }

        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(key) {
            objects.insert(key.to_string(), bytes);
            self.uploads.lock().unwrap().push(key.to_string());
        }

        Ok(Self::reference(key))
    }

    async fn reference_for(&self, key: &str) -> Result<PublishedReference, PublishFailure> {
        Ok(Self::reference(key))
    }
}

/// Append-only detail ledger held in memory, with the fingerprint lookup
/// the fingerprint store depends on.
#[derive(Default)]
pub struct MemoryDetailLedger {
    pub records: Mutex<Vec<(RecordIdentity, DetailRecord)>>,
    pub fail: bool,
}

impl MemoryDetailLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Seed a record as if a prior run had published this content.
    pub fn seed_prior_run(&self, fingerprint: &Fingerprint, reference: PublishedReference) {
        let record = DetailRecord {
            client: "acme-travel".to_string(),
            source: "tmc-portal".to_string(),
            source_url: "http://prior-run/doc.pdf".to_string(),
            row_context: serde_json::json!({}),
            fingerprint: fingerprint.clone(),
            reference,
            status: "SUCCESS".to_string(),
            processed_at: Utc::now(),
        };
        self.records
            .lock()
            .unwrap()
            .push((Uuid::new_v4(), record));
    }
}

#[async_trait]
impl DetailLedger for MemoryDetailLedger {
    async fn insert(&self, record: &DetailRecord) -> Result<RecordIdentity, LedgerFailure> {
        if self.fail {
            return Err(LedgerFailure::new("detail ledger unavailable"));
        }
        let id = Uuid::new_v4();
        self.records.lock().unwrap().push((id, record.clone()));
        Ok(id)
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<PublishedReference>, LedgerFailure> {
        if self.fail {
            return Err(LedgerFailure::new("detail ledger unavailable"));
        }
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .rev()
            .find(|(_, r)| &r.fingerprint == fingerprint)
            .map(|(_, r)| r.reference.clone()))
    }
}

/// Append-only summary ledger held in memory.
#[derive(Default)]
pub struct MemorySummaryLedger {
    pub records: Mutex<Vec<(RecordIdentity, SummaryRecord)>>,
    pub fail: bool,
}

impl MemorySummaryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryLedger for MemorySummaryLedger {
    async fn insert(&self, record: &SummaryRecord) -> Result<RecordIdentity, LedgerFailure> {
        if self.fail {
            return Err(LedgerFailure::new("summary ledger unavailable"));
        }
        let id = Uuid::new_v4();
        self.records.lock().unwrap().push((id, record.clone()));
        Ok(id)
    }
}

/// Assemble a run controller over the in-memory collaborators.
#[allow(clippy::too_many_arguments)]
pub fn controller(
    retriever: Arc<ScriptedRetriever>,
    publisher: Arc<MemoryPublisher>,
    detail: Arc<MemoryDetailLedger>,
    summary: Arc<MemorySummaryLedger>,
    input: &Path,
    output: &Path,
    concurrency: usize,
) -> RunController {
    RunController::new(
        retriever as Arc<dyn Retriever>,
        publisher as Arc<dyn Publisher>,
        detail as Arc<dyn DetailLedger>,
        summary as Arc<dyn SummaryLedger>,
        RowExpander::new("HOTEL_INVOICE_PATH", ",;|", None),
        ProcessorContext {
            client: "acme-travel".to_string(),
            source: "tmc-portal".to_string(),
            key_prefix: "tmc-portal".to_string(),
        },
        concurrency,
        RunOptions {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            upload_output: false,
        },
    )
}
