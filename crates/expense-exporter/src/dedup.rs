//! Per-fingerprint publication claims
//!
//! Guarantees at most one upload per fingerprint per run. The first caller
//! for a fingerprint is told to publish; concurrent callers for the same
//! fingerprint wait until the first caller records the published reference
//! (or releases the claim on failure, at which point one waiter takes over).
//! Before treating a fingerprint as new, the store consults the detail
//! ledger, so duplicate suppression survives process restarts.

use exporter_common::Fingerprint;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::ledger::{DetailLedger, LedgerFailure};
use crate::storage::PublishedReference;

/// Outcome of asking the store about a fingerprint.
#[derive(Debug)]
pub enum Publication {
    /// First caller for this content: publish, then `complete` or `release`.
    Claimed,
    /// Content already published this run or a prior run; reuse.
    Reused(PublishedReference),
}

enum Slot {
    InFlight(watch::Sender<bool>),
    Published(PublishedReference),
}

pub struct FingerprintStore {
    detail: Arc<dyn DetailLedger>,
    slots: Mutex<HashMap<Fingerprint, Slot>>,
}

impl FingerprintStore {
    pub fn new(detail: Arc<dyn DetailLedger>) -> Self {
        Self {
            detail,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic per-fingerprint check-and-set. Blocks while another caller
    /// holds the claim for the same fingerprint.
    pub async fn acquire(&self, fingerprint: &Fingerprint) -> Result<Publication, LedgerFailure> {
        loop {
            let waiter = {
                let mut slots = self.slots.lock().await;
                match slots.get(fingerprint) {
                    Some(Slot::Published(reference)) => {
                        return Ok(Publication::Reused(reference.clone()));
                    }
                    Some(Slot::InFlight(tx)) => Some(tx.subscribe()),
                    None => {
                        let (tx, _rx) = watch::channel(false);
                        slots.insert(fingerprint.clone(), Slot::InFlight(tx));
                        None
                    }
                }
            };

            if let Some(mut rx) = waiter {
                // Wakes when the claim holder completes or releases; a
                // closed channel means the same thing.
                let _ = rx.changed().await;
                continue;
            }

            // The claim is ours. A prior run may already have published
            // this content; the detail ledger is the durable record.
            return match self.detail.find_by_fingerprint(fingerprint).await {
                Ok(Some(reference)) => {
                    debug!(
                        fingerprint = fingerprint.short(),
                        "Content published in a prior run, reusing"
                    );
                    self.complete(fingerprint, reference.clone()).await;
                    Ok(Publication::Reused(reference))
                }
                Ok(None) => Ok(Publication::Claimed),
                Err(e) => {
                    self.release(fingerprint).await;
                    Err(e)
                }
            };
        }
    }

    /// Record the published reference and wake waiters.
    pub async fn complete(&self, fingerprint: &Fingerprint, reference: PublishedReference) {
        let previous = {
            let mut slots = self.slots.lock().await;
            slots.insert(fingerprint.clone(), Slot::Published(reference))
        };
        if let Some(Slot::InFlight(tx)) = previous {
            let _ = tx.send(true);
        }
    }

    /// Give up a claim after a failed publish so a waiter can take over.
    pub async fn release(&self, fingerprint: &Fingerprint) {
        let previous = { self.slots.lock().await.remove(fingerprint) };
        if let Some(Slot::InFlight(tx)) = previous {
            let _ = tx.send(true);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FakeDetailLedger {
        prior: Option<PublishedReference>,
        fail: bool,
    }

    #[async_trait]
    impl DetailLedger for FakeDetailLedger {
        async fn insert(
            &self,
            _record: &crate::ledger::DetailRecord,
        ) -> Result<crate::ledger::RecordIdentity, LedgerFailure> {
            unreachable!("not used by these tests")
        }

        async fn find_by_fingerprint(
            &self,
            _fingerprint: &Fingerprint,
        ) -> Result<Option<PublishedReference>, LedgerFailure> {
            if self.fail {
                return Err(LedgerFailure::new("ledger down"));
            }
            Ok(self.prior.clone())
        }
    }

    fn store(prior: Option<PublishedReference>) -> Arc<FingerprintStore> {
        Arc::new(FingerprintStore::new(Arc::new(FakeDetailLedger {
            prior,
            fail: false,
        })))
    }

    fn reference(key: &str) -> PublishedReference {
        PublishedReference {
            key: key.to_string(),
            url: format!("https://bucket.s3.amazonaws.com/{key}"),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_first_caller_claims_then_others_reuse() {
        let store = store(None);
        let fp = Fingerprint::of_bytes(b"doc");

        assert!(matches!(store.acquire(&fp).await.unwrap(), Publication::Claimed));
        store.complete(&fp, reference("k1")).await;

        match store.acquire(&fp).await.unwrap() {
            Publication::Reused(r) => assert_eq!(r.key, "k1"),
            other => panic!("expected reuse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_caller_waits_for_claim_holder() {
        let store = store(None);
        let fp = Fingerprint::of_bytes(b"doc");

        assert!(matches!(store.acquire(&fp).await.unwrap(), Publication::Claimed));

        let waiter = {
            let store = Arc::clone(&store);
            let fp = fp.clone();
            tokio::spawn(async move { store.acquire(&fp).await })
        };

        // The waiter must not resolve while the claim is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        store.complete(&fp, reference("k1")).await;

        match waiter.await.unwrap().unwrap() {
            Publication::Reused(r) => assert_eq!(r.key, "k1"),
            other => panic!("expected reuse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_release_hands_claim_to_waiter() {
        let store = store(None);
        let fp = Fingerprint::of_bytes(b"doc");

        assert!(matches!(store.acquire(&fp).await.unwrap(), Publication::Claimed));

        let waiter = {
            let store = Arc::clone(&store);
            let fp = fp.clone();
            tokio::spawn(async move { store.acquire(&fp).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.release(&fp).await;

        // The failed claim is handed over: the waiter becomes the publisher.
        assert!(matches!(waiter.await.unwrap().unwrap(), Publication::Claimed));
    }

    #[tokio::test]
    async fn test_prior_run_publication_is_reused() {
        let store = store(Some(reference("prior-key")));
        let fp = Fingerprint::of_bytes(b"doc");

        match store.acquire(&fp).await.unwrap() {
            Publication::Reused(r) => assert_eq!(r.key, "prior-key"),
            other => panic!("expected reuse, got {other:?}"),
        }

        // The lookup result is cached for the rest of the run.
        assert!(matches!(
            store.acquire(&fp).await.unwrap(),
            Publication::Reused(_)
        ));
    }

    #[tokio::test]
    async fn test_ledger_error_releases_claim() {
        let failing = Arc::new(FingerprintStore::new(Arc::new(FakeDetailLedger {
            prior: None,
            fail: true,
        })));
        let fp = Fingerprint::of_bytes(b"doc");

        assert!(failing.acquire(&fp).await.is_err());

        // The claim must not be stuck: the next caller gets a fresh attempt.
        assert!(failing.acquire(&fp).await.is_err());
    }
}
