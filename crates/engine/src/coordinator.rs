//! Transaction coordinator
//!
//! Wraps [`TransactionManager`] with snapshot creation and lifecycle
//! counters. The counters use `Relaxed` ordering: they are observational
//! and synchronize nothing else.

use entkit_concurrency::{TransactionContext, TransactionManager};
use entkit_core::traits::{SnapshotView, Storage};
use entkit_core::{Error, Result};
use entkit_storage::ShardedStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Starts and commits transactions and keeps lifecycle counts.
pub struct TransactionCoordinator {
    manager: TransactionManager,
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Coordinator whose first commit gets `initial_version + 1`
    pub fn new(initial_version: u64) -> Self {
        Self {
            manager: TransactionManager::new(initial_version),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Begin a transaction over a fresh snapshot of `storage`
    pub fn start_transaction(&self, storage: &Arc<ShardedStore>) -> TransactionContext {
        let txn_id = self.manager.next_txn_id();
        let snapshot = storage.snapshot();
        self.record_start();
        debug!(
            target: "entkit::txn",
            txn_id,
            start_version = snapshot.version(),
            "transaction started"
        );
        TransactionContext::with_snapshot(txn_id, Box::new(snapshot))
    }

    /// Validate and apply `txn`, updating the counters either way
    pub fn commit<S: Storage>(&self, txn: &mut TransactionContext, store: &S) -> Result<u64> {
        match self.manager.commit_or_rollback(txn, store) {
            Ok(version) => {
                self.record_commit();
                debug!(target: "entkit::txn", txn_id = txn.txn_id, version, "transaction committed");
                Ok(version)
            }
            Err(e) => {
                self.record_abort();
                debug!(target: "entkit::txn", txn_id = txn.txn_id, error = %e, "transaction aborted");
                Err(Error::from(e))
            }
        }
    }

    /// Abort without committing, e.g. when the closure returned an error
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) {
        let reason = reason.into();
        if txn.can_rollback() {
            let _ = self.manager.abort(txn, reason.clone());
        }
        self.record_abort();
        debug!(target: "entkit::txn", txn_id = txn.txn_id, %reason, "transaction aborted");
    }

    fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_commit(&self) {
        self.finish();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_abort(&self) {
        self.finish();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        // saturating so a stray abort cannot wrap the gauge
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Latest allocated commit version
    pub fn current_version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);
        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }

    /// Transactions begun but not yet committed or aborted
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Sleep-poll until no transaction is active or `timeout` passes
    ///
    /// Returns false on timeout.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while self.active_count() > 0 {
            if start.elapsed() > timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("manager", &self.manager)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Transaction lifecycle counts
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// Currently active
    pub active_count: u64,
    /// Started since open
    pub total_started: u64,
    /// Committed since open
    pub total_committed: u64,
    /// Aborted since open, conflicts and application errors alike
    pub total_aborted: u64,
    /// committed / started
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Committed plus aborted
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// aborted / completed
    pub fn abort_rate(&self) -> f64 {
        let completed = self.total_completed();
        if completed > 0 {
            self.total_aborted as f64 / completed as f64
        } else {
            0.0
        }
    }
}
