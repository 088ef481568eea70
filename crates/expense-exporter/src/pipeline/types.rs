//! Outcome types for the pipeline

use exporter_common::Fingerprint;
use thiserror::Error;

use crate::ledger::{LedgerFailure, RecordIdentity};
use crate::retrieve::RetrievalFailure;
use crate::storage::{PublishFailure, PublishedReference};

/// Row status written for rows that were never started because the run was
/// asked to stop.
pub const CANCELLED_ROW_STATUS: &str = "cancelled";

/// Pipeline stage at which a candidate can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    Retrieve,
    Fingerprint,
    Publish,
    Detail,
    Summary,
}

impl LinkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStage::Retrieve => "retrieve",
            LinkStage::Fingerprint => "fingerprint",
            LinkStage::Publish => "publish",
            LinkStage::Detail => "detail",
            LinkStage::Summary => "summary",
        }
    }
}

/// Why a candidate failed. Link-scoped: terminates only the owning
/// candidate, never its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFailure {
    #[error("{0}")]
    Retrieval(#[from] RetrievalFailure),

    #[error("EmptyDocument")]
    EmptyDocument,

    #[error("{0}")]
    Publish(#[from] PublishFailure),

    #[error("{0}")]
    Ledger(#[from] LedgerFailure),
}

/// Everything a fully processed candidate produced.
#[derive(Debug, Clone)]
pub struct CompletedLink {
    pub fingerprint: Fingerprint,
    pub reference: PublishedReference,
    pub detail_id: RecordIdentity,
    pub summary_id: RecordIdentity,
    /// Content was already published; no upload happened for this link.
    pub reused: bool,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone)]
pub enum LinkStatus {
    Completed(CompletedLink),
    Failed {
        stage: LinkStage,
        failure: LinkFailure,
    },
}

/// Terminal outcome of one candidate, carried back to the output artifact.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub link_index: usize,
    pub raw: String,
    pub url: String,
    pub status: LinkStatus,
}

impl LinkOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, LinkStatus::Completed(_))
    }

    pub fn status_cell(&self) -> String {
        match &self.status {
            LinkStatus::Completed(_) => "SUCCESS".to_string(),
            LinkStatus::Failed { failure, .. } => format!("FAILED: {failure}"),
        }
    }

    pub fn hash_cell(&self) -> String {
        match &self.status {
            LinkStatus::Completed(link) => link.fingerprint.as_hex().to_string(),
            LinkStatus::Failed { .. } => String::new(),
        }
    }

    pub fn s3_link_cell(&self) -> String {
        match &self.status {
            LinkStatus::Completed(link) => link.reference.url.clone(),
            LinkStatus::Failed { .. } => String::new(),
        }
    }
}

/// Overall row status, by precedence over the candidate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    AllSucceeded,
    Partial,
    AllFailed,
    NoLinks,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::AllSucceeded => "all-succeeded",
            RowStatus::Partial => "partial",
            RowStatus::AllFailed => "all-failed",
            RowStatus::NoLinks => "no-links",
        }
    }
}

/// Aggregate over all candidates of one row. Written to the output
/// artifact only; never persisted to either ledger.
#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub row_index: usize,
    pub links: Vec<LinkOutcome>,
    pub status: RowStatus,
    /// Set when the row itself could not be read.
    pub structural_error: Option<String>,
}

impl RowOutcome {
    /// Aggregate candidate outcomes. Precedence: zero candidates is
    /// `no-links`, all completed is `all-succeeded`, all failed is
    /// `all-failed`, anything mixed is `partial`.
    pub fn from_links(row_index: usize, links: Vec<LinkOutcome>) -> Self {
        let status = if links.is_empty() {
            RowStatus::NoLinks
        } else {
            let completed = links.iter().filter(|l| l.is_completed()).count();
            if completed == links.len() {
                RowStatus::AllSucceeded
            } else if completed == 0 {
                RowStatus::AllFailed
            } else {
                RowStatus::Partial
            }
        };

        Self {
            row_index,
            links,
            status,
            structural_error: None,
        }
    }

    pub fn no_links(row_index: usize) -> Self {
        Self::from_links(row_index, Vec::new())
    }

    /// A row that could not even be read: marked failed, run continues.
    pub fn structural(row_index: usize, error: String) -> Self {
        Self {
            row_index,
            links: Vec::new(),
            status: RowStatus::AllFailed,
            structural_error: Some(error),
        }
    }

    pub fn status_cell(&self) -> String {
        match &self.structural_error {
            Some(error) => format!("{}: {}", self.status.as_str(), error),
            None => self.status.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(link_index: usize) -> LinkOutcome {
        LinkOutcome {
            link_index,
            raw: format!("doc{link_index}.pdf"),
            url: format!("http://a/doc{link_index}.pdf"),
            status: LinkStatus::Completed(CompletedLink {
                fingerprint: Fingerprint::of_bytes(&[link_index as u8]),
                reference: PublishedReference {
                    key: format!("k{link_index}"),
                    url: format!("https://s3/k{link_index}"),
                    expires_at: None,
                },
                detail_id: uuid::Uuid::new_v4(),
                summary_id: uuid::Uuid::new_v4(),
                reused: false,
            }),
        }
    }

    fn failed(link_index: usize) -> LinkOutcome {
        LinkOutcome {
            link_index,
            raw: format!("doc{link_index}.pdf"),
            url: format!("http://a/doc{link_index}.pdf"),
            status: LinkStatus::Failed {
                stage: LinkStage::Retrieve,
                failure: LinkFailure::Retrieval(RetrievalFailure::ServerError(500)),
            },
        }
    }

    #[test]
    fn test_row_status_precedence() {
        assert_eq!(RowOutcome::from_links(0, vec![]).status, RowStatus::NoLinks);
        assert_eq!(
            RowOutcome::from_links(0, vec![completed(0), completed(1)]).status,
            RowStatus::AllSucceeded
        );
        assert_eq!(
            RowOutcome::from_links(0, vec![failed(0), failed(1)]).status,
            RowStatus::AllFailed
        );
        assert_eq!(
            RowOutcome::from_links(0, vec![completed(0), failed(1)]).status,
            RowStatus::Partial
        );
    }

    #[test]
    fn test_failure_status_cell_names_the_kind() {
        let cell = failed(0).status_cell();
        assert!(cell.starts_with("FAILED: "));
        assert!(cell.contains("ServerError"));
    }

    #[test]
    fn test_structural_row_carries_marker() {
        let outcome = RowOutcome::structural(3, "row has 2 values but the header has 3 columns".into());
        assert_eq!(outcome.status, RowStatus::AllFailed);
        let cell = outcome.status_cell();
        assert!(cell.starts_with("all-failed: "));
        assert!(cell.contains("2 values"));
    }

    #[test]
    fn test_failed_link_has_empty_hash_and_link_cells() {
        let outcome = failed(0);
        assert!(outcome.hash_cell().is_empty());
        assert!(outcome.s3_link_cell().is_empty());
    }
}
