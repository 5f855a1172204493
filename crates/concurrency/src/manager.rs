//! Transaction manager for coordinating commits
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Acquire commit lock
//! 2. validate: Active → Validating → Committed | Aborted
//! 3. Allocate commit_version (one per transaction)
//! 4. apply_writes() with commit_version
//! 5. publish commit_version on the store
//! 6. Release commit lock
//! ```
//!
//! Publishing after the apply keeps a half-applied commit invisible to
//! snapshots taken concurrently.

use crate::{CommitError, TransactionContext, TransactionStatus};
use entkit_core::error::Result;
use entkit_core::traits::Storage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates ids and versions and serializes commits
///
/// # Thread Safety
///
/// Validation and apply run under one lock so no other transaction can
/// change storage between a successful validation and its apply.
pub struct TransactionManager {
    /// Global version counter, one increment per committed transaction
    version: AtomicU64,

    next_txn_id: AtomicU64,

    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Create a manager starting at `initial_version`
    pub fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate next commit version
    pub fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Commit a transaction atomically
    ///
    /// Read-only transactions commit without allocating a version and
    /// return the start version.
    ///
    /// # Returns
    /// - Ok(commit_version) on success
    /// - Err(CommitError) on conflict, bad state, or storage failure
    pub fn commit<S: Storage>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> std::result::Result<u64, CommitError> {
        let _commit_guard = self.commit_lock.lock();

        txn.commit(store)?;

        if txn.is_read_only() {
            return Ok(txn.start_version);
        }

        let commit_version = self.allocate_version();

        if let Err(e) = txn.apply_writes(store, commit_version) {
            tracing::error!(
                target: "entkit::txn",
                txn_id = txn.txn_id,
                commit_version,
                error = %e,
                "apply failed after validation"
            );
            txn.status = TransactionStatus::Aborted {
                reason: format!("apply failed: {}", e),
            };
            // keep the store version in step with the allocated one
            store.publish_version(commit_version);
            return Err(CommitError::Storage(e.to_string()));
        }

        store.publish_version(commit_version);
        Ok(commit_version)
    }

    /// Explicitly abort a transaction
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) -> Result<()> {
        txn.mark_aborted(reason)
    }

    /// Commit, making sure the transaction ends Aborted on failure
    pub fn commit_or_rollback<S: Storage>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> std::result::Result<u64, CommitError> {
        match self.commit(txn, store) {
            Ok(version) => Ok(version),
            Err(e) => {
                if txn.can_rollback() {
                    let _ = txn.mark_aborted(format!("Commit failed: {}", e));
                }
                Err(e)
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("version", &self.current_version())
            .field("next_txn_id", &self.next_txn_id.load(Ordering::SeqCst))
            .finish()
    }
}
