//! Per-row orchestration
//!
//! Expands one row into candidates, runs them through the link processor
//! with bounded concurrency, and aggregates the outcomes.

use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::expand::RowExpander;
use crate::sheet::InputRow;

use super::processor::LinkProcessor;
use super::types::RowOutcome;

pub struct RowOrchestrator {
    expander: RowExpander,
    processor: Arc<LinkProcessor>,
    concurrency: usize,
}

impl RowOrchestrator {
    pub fn new(expander: RowExpander, processor: Arc<LinkProcessor>, concurrency: usize) -> Self {
        Self {
            expander,
            processor,
            concurrency: concurrency.max(1),
        }
    }

    /// Process every candidate of a row and aggregate the outcomes. The
    /// buffered stream completes candidates in any order but yields them in
    /// emission order, so output columns always match the original link
    /// order.
    pub async fn process_row(&self, row: &InputRow) -> RowOutcome {
        let candidates = self.expander.expand(row);

        if candidates.is_empty() {
            debug!(row = row.index() + 1, "No links in row");
            return RowOutcome::no_links(row.index());
        }

        debug!(
            row = row.index() + 1,
            candidates = candidates.len(),
            "Processing row"
        );

        let outcomes = stream::iter(
            candidates
                .into_iter()
                .map(|candidate| self.processor.process(row, candidate)),
        )
        .buffered(self.concurrency)
        .collect::<Vec<_>>()
        .await;

        RowOutcome::from_links(row.index(), outcomes)
    }
}
