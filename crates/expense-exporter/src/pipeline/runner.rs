//! The run controller
//!
//! Iterates every input row exactly once, in input order, through the row
//! orchestrator, then writes the enriched output artifact in one pass. The
//! run as a whole fails only when the input cannot be read or the output
//! cannot be written; everything else is reported per row or per link.

use exporter_common::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::ExporterConfig;
use crate::dedup::FingerprintStore;
use crate::expand::RowExpander;
use crate::ledger::{DetailLedger, PgDetailLedger, PgSummaryLedger, SummaryLedger};
use crate::retrieve::{HttpRetriever, Retriever};
use crate::sheet::{self, InputRow, LinkCells, OutputRow};
use crate::storage::{artifact_key, Publisher, Storage};

use super::orchestrator::RowOrchestrator;
use super::processor::{LinkProcessor, ProcessorContext};
use super::types::{RowOutcome, RowStatus, CANCELLED_ROW_STATUS};

/// Artifact locations and end-of-run behavior.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Publish the finished output artifact to object storage.
    pub upload_output: bool,
}

/// End-of-run accounting.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub total_rows: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub no_links: usize,
    /// Rows never started because the run was asked to stop.
    pub cancelled: usize,
    pub elapsed: Duration,
}

pub struct RunController {
    orchestrator: RowOrchestrator,
    publisher: Arc<dyn Publisher>,
    context: ProcessorContext,
    options: RunOptions,
    shutdown: Arc<AtomicBool>,
}

impl RunController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        retriever: Arc<dyn Retriever>,
        publisher: Arc<dyn Publisher>,
        detail: Arc<dyn DetailLedger>,
        summary: Arc<dyn SummaryLedger>,
        expander: RowExpander,
        context: ProcessorContext,
        concurrency: usize,
        options: RunOptions,
    ) -> Self {
        let fingerprints = Arc::new(FingerprintStore::new(Arc::clone(&detail)));
        let processor = Arc::new(LinkProcessor::new(
            retriever,
            Arc::clone(&publisher),
            fingerprints,
            detail,
            summary,
            context.clone(),
        ));
        let orchestrator = RowOrchestrator::new(expander, processor, concurrency);

        Self {
            orchestrator,
            publisher,
            context,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wire up the production collaborators from configuration.
    pub async fn from_config(config: &ExporterConfig) -> anyhow::Result<Self> {
        let retriever: Arc<dyn Retriever> = Arc::new(HttpRetriever::new()?);
        let publisher: Arc<dyn Publisher> = Arc::new(Storage::new(config.storage.clone()).await?);
        let detail: Arc<dyn DetailLedger> =
            Arc::new(PgDetailLedger::connect(&config.detail_database_url).await?);
        let summary: Arc<dyn SummaryLedger> =
            Arc::new(PgSummaryLedger::connect(&config.summary_database_url).await?);

        let expander = RowExpander::new(
            &config.link_field,
            &config.link_delimiters,
            config.link_base_url.clone(),
        );
        let context = ProcessorContext {
            client: config.client.clone(),
            source: config.source.clone(),
            key_prefix: config.storage.key_prefix.clone(),
        };
        let options = RunOptions {
            input_path: config.input_path.clone(),
            output_path: config.output_path.clone(),
            upload_output: config.upload_output,
        };

        Ok(Self::new(
            retriever,
            publisher,
            detail,
            summary,
            expander,
            context,
            config.concurrency,
            options,
        ))
    }

    /// Flag checked between rows; in-flight candidates still reach a
    /// terminal state before the run winds down.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Execute the whole run. Every input row appears in the output with a
    /// status; nothing is silently dropped.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        info!(input = %self.options.input_path.display(), "Starting expense exporter run");

        let input = sheet::read_sheet(&self.options.input_path)?;
        info!(rows = input.len(), "Loaded input artifact");

        let mut outcomes: Vec<RowOutcome> = Vec::with_capacity(input.len());
        for row in input.rows() {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!(
                    processed = outcomes.len(),
                    remaining = input.len() - outcomes.len(),
                    "Stop requested, winding down after in-flight work"
                );
                break;
            }

            let outcome = match row.structural_error() {
                Some(problem) => {
                    warn!(row = row.index() + 1, %problem, "Structurally invalid row");
                    RowOutcome::structural(row.index(), problem)
                }
                None => self.orchestrator.process_row(row).await,
            };
            outcomes.push(outcome);
        }

        let link_width = outcomes.iter().map(|o| o.links.len()).max().unwrap_or(0);
        let output_rows: Vec<OutputRow> = input
            .rows()
            .iter()
            .map(|row| match outcomes.get(row.index()) {
                Some(outcome) => enriched_row(row, outcome),
                None => cancelled_row(row),
            })
            .collect();

        sheet::write_sheet(
            &self.options.output_path,
            input.headers(),
            &output_rows,
            link_width,
        )?;
        info!(output = %self.options.output_path.display(), "Output artifact written");

        if self.options.upload_output {
            self.upload_output_artifact().await;
        }

        let summary = summarize(&outcomes, input.len(), started.elapsed());
        info!(
            total_rows = summary.total_rows,
            succeeded = summary.succeeded,
            partial = summary.partial,
            failed = summary.failed,
            no_links = summary.no_links,
            cancelled = summary.cancelled,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Run complete"
        );

        Ok(summary)
    }

    /// Best-effort: a failed artifact upload is logged, not fatal - the
    /// local output file is already the source of truth.
    async fn upload_output_artifact(&self) {
        let path = &self.options.output_path;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "output.csv".to_string());
        let key = artifact_key(&self.context.key_prefix, &self.context.client, &filename);

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read output artifact for upload");
                return;
            }
        };

        match self.publisher.publish(&key, bytes).await {
            Ok(reference) => info!(url = %reference.url, "Output artifact uploaded"),
            Err(e) => error!(key = %key, error = %e, "Failed to upload output artifact"),
        }
    }
}

fn enriched_row(row: &InputRow, outcome: &RowOutcome) -> OutputRow {
    OutputRow {
        values: row.values().to_vec(),
        link_cells: outcome
            .links
            .iter()
            .map(|link| LinkCells {
                link: link.url.clone(),
                hash: link.hash_cell(),
                s3_link: link.s3_link_cell(),
                status: link.status_cell(),
            })
            .collect(),
        status: outcome.status_cell(),
    }
}

fn cancelled_row(row: &InputRow) -> OutputRow {
    OutputRow {
        values: row.values().to_vec(),
        link_cells: Vec::new(),
        status: CANCELLED_ROW_STATUS.to_string(),
    }
}

fn summarize(outcomes: &[RowOutcome], total_rows: usize, elapsed: Duration) -> RunSummary {
    let mut summary = RunSummary {
        total_rows,
        succeeded: 0,
        partial: 0,
        failed: 0,
        no_links: 0,
        cancelled: total_rows - outcomes.len(),
        elapsed,
    };

    for outcome in outcomes {
        match outcome.status {
            RowStatus::AllSucceeded => summary.succeeded += 1,
            RowStatus::Partial => summary.partial += 1,
            RowStatus::AllFailed => summary.failed += 1,
            RowStatus::NoLinks => summary.no_links += 1,
        }
    }

    summary
}
