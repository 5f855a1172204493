//! Transaction context for OCC
//!
//! TransactionContext tracks the reads, writes and deletes of one transaction
//! so it can be validated at commit time.
//!
//! # Read-your-writes
//!
//! `get` checks, in order:
//! 1. **write_set**: uncommitted write from this transaction
//! 2. **delete_set**: uncommitted delete from this transaction (returns None)
//! 3. **snapshot**: value at the start version, recorded in the read set
//!
//! # Lifecycle
//!
//! Active → Validating → Committed | Aborted. Active → Aborted on user
//! abort or application error. Committed and Aborted are terminal.

use crate::validation::{validate_transaction, ValidationResult};
use entkit_core::error::{Error, Result};
use entkit_core::traits::{SnapshotView, Storage};
use entkit_core::types::Key;
use entkit_core::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

/// Error type for commit failures
#[derive(Debug, Clone)]
pub enum CommitError {
    /// Read-set validation found conflicts
    ValidationFailed(ValidationResult),

    /// Transaction was not in a committable state
    InvalidState(String),

    /// Applying writes to storage failed
    Storage(String),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitError::ValidationFailed(result) => {
                write!(f, "Commit failed: {} conflict(s)", result.conflict_count())
            }
            CommitError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CommitError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<CommitError> for Error {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => {
                let keys: Vec<String> = result
                    .conflicting_keys()
                    .into_iter()
                    .map(|k| k.to_string())
                    .collect();
                Error::Conflict(format!(
                    "{} conflict(s) on [{}]",
                    result.conflict_count(),
                    keys.join(", ")
                ))
            }
            CommitError::InvalidState(state) => Error::TransactionNotActive { state },
            CommitError::Storage(msg) => Error::Storage(msg),
        }
    }
}

/// Result of applying transaction writes to storage
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// Version assigned to all writes in this transaction
    pub commit_version: u64,
    /// Number of puts applied
    pub puts_applied: usize,
    /// Number of deletes applied
    pub deletes_applied: usize,
}

impl ApplyResult {
    /// Total number of operations applied
    pub fn total_operations(&self) -> usize {
        self.puts_applied + self.deletes_applied
    }
}

/// Buffered operations that commit would apply or abort would discard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of pending put operations
    pub puts: usize,
    /// Number of pending delete operations
    pub deletes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.deletes
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "Active"),
            TransactionStatus::Validating => write!(f, "Validating"),
            TransactionStatus::Committed => write!(f, "Committed"),
            TransactionStatus::Aborted { reason } => write!(f, "Aborted ({})", reason),
        }
    }
}

/// State of one optimistic transaction
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,

    /// Version at transaction start; all snapshot reads see this version
    pub start_version: u64,

    snapshot: Option<Box<dyn SnapshotView>>,

    /// Keys read from the snapshot and the version seen (0 = absent)
    pub read_set: HashMap<Key, u64>,

    /// Buffered writes, invisible to other transactions until commit
    pub write_set: HashMap<Key, Value>,

    /// Buffered deletes
    pub delete_set: HashSet<Key>,

    /// Current transaction status
    pub status: TransactionStatus,

    start_time: Instant,
}

impl TransactionContext {
    /// Create a transaction without a snapshot
    ///
    /// Reads fail; useful for write-only transactions and tests.
    ///
    /// ```
    /// use entkit_concurrency::TransactionContext;
    ///
    /// let txn = TransactionContext::new(1, 100);
    /// assert!(txn.is_active());
    /// ```
    pub fn new(txn_id: u64, start_version: u64) -> Self {
        TransactionContext {
            txn_id,
            start_version,
            snapshot: None,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            delete_set: HashSet::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Create a transaction reading from `snapshot`
    pub fn with_snapshot(txn_id: u64, snapshot: Box<dyn SnapshotView>) -> Self {
        let mut txn = Self::new(txn_id, snapshot.version());
        txn.snapshot = Some(snapshot);
        txn
    }

    // === Read Operations ===

    /// Read a key with read-your-writes semantics
    ///
    /// # Errors
    /// `TransactionNotActive` if the transaction is not active.
    pub fn get(&mut self, key: &Key) -> Result<Option<Value>> {
        self.ensure_active()?;

        if let Some(value) = self.write_set.get(key) {
            return Ok(Some(value.clone()));
        }
        if self.delete_set.contains(key) {
            return Ok(None);
        }
        self.read_from_snapshot(key)
    }

    fn read_from_snapshot(&mut self, key: &Key) -> Result<Option<Value>> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| Error::internal("transaction has no snapshot for reads"))?;

        match snapshot.get(key)? {
            Some(vv) => {
                self.read_set.insert(key.clone(), vv.version);
                Ok(Some(vv.value))
            }
            None => {
                // a concurrent create of this key must conflict
                self.read_set.insert(key.clone(), 0);
                Ok(None)
            }
        }
    }

    /// Check if a key exists in the transaction's view
    ///
    /// Tracks the read like `get`.
    pub fn exists(&mut self, key: &Key) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries of one kind, merged with this transaction's writes
    ///
    /// Snapshot entries are recorded in the read set. Results are sorted by
    /// key.
    pub fn scan_kind(&mut self, kind: &str) -> Result<Vec<(Key, Value)>> {
        self.scan_scoped(kind, None)
    }

    /// Entries of `kind` below `ancestor`, merged with this transaction's
    /// writes
    ///
    /// Only the matching snapshot entries enter the read set.
    pub fn scan_descendants(&mut self, kind: &str, ancestor: &Key) -> Result<Vec<(Key, Value)>> {
        self.scan_scoped(kind, Some(ancestor))
    }

    fn scan_scoped(&mut self, kind: &str, ancestor: Option<&Key>) -> Result<Vec<(Key, Value)>> {
        self.ensure_active()?;

        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| Error::internal("transaction has no snapshot for reads"))?;

        let entries = match ancestor {
            Some(ancestor) => snapshot.scan_descendants(kind, ancestor)?,
            None => snapshot.scan_kind(kind)?,
        };

        let mut results: BTreeMap<Key, Value> = BTreeMap::new();
        for (key, vv) in entries {
            if !self.delete_set.contains(&key) {
                self.read_set.insert(key.clone(), vv.version);
                results.insert(key, vv.value);
            }
        }
        for (key, value) in &self.write_set {
            if key.kind() == kind && ancestor.map_or(true, |a| key.is_descendant_of(a)) {
                results.insert(key.clone(), value.clone());
            }
        }

        Ok(results.into_iter().collect())
    }

    /// Version recorded for a key in the read set
    pub fn get_read_version(&self, key: &Key) -> Option<u64> {
        self.read_set.get(key).copied()
    }

    // === Write Operations ===

    /// Buffer a write
    ///
    /// Writes are blind: no read-set entry unless the key was read first.
    pub fn put(&mut self, key: Key, value: Value) -> Result<()> {
        self.ensure_active()?;
        self.delete_set.remove(&key);
        self.write_set.insert(key, value);
        Ok(())
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: Key) -> Result<()> {
        self.ensure_active()?;
        self.write_set.remove(&key);
        self.delete_set.insert(key);
        Ok(())
    }

    // === State Management ===

    /// Check if transaction is in Active state
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction is committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction is aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Active or Validating transactions can still be rolled back
    pub fn can_rollback(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        )
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Fail unless the transaction is Active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive {
                state: self.status.to_string(),
            })
        }
    }

    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> Result<()> {
        match &self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            other => Err(Error::TransactionNotActive {
                state: other.to_string(),
            }),
        }
    }

    /// Abort and discard buffered writes
    ///
    /// Allowed from Active or Validating. The read set is kept for
    /// diagnostics.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> Result<()> {
        if !self.can_rollback() {
            return Err(Error::TransactionNotActive {
                state: self.status.to_string(),
            });
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.write_set.clear();
        self.delete_set.clear();
        Ok(())
    }

    /// Counts of buffered operations
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            puts: self.write_set.len(),
            deletes: self.delete_set.len(),
        }
    }

    /// Number of keys in the read set
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// True if nothing is buffered
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.delete_set.is_empty()
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    // === Commit Operation ===

    /// Validate against `store` and move to Committed or Aborted
    ///
    /// Performs validation and state transitions only. Writes are applied
    /// separately by [`TransactionContext::apply_writes`] under the
    /// manager's commit lock.
    pub fn commit<S: Storage>(&mut self, store: &S) -> std::result::Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(self.status.to_string()));
        }
        self.status = TransactionStatus::Validating;

        let validation = match validate_transaction(self, store) {
            Ok(validation) => validation,
            Err(e) => {
                self.status = TransactionStatus::Aborted {
                    reason: format!("validation error: {}", e),
                };
                return Err(CommitError::Storage(e.to_string()));
            }
        };

        if !validation.is_valid() {
            self.status = TransactionStatus::Aborted {
                reason: format!(
                    "Commit failed: {} conflict(s) detected",
                    validation.conflict_count()
                ),
            };
            return Err(CommitError::ValidationFailed(validation));
        }

        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Apply buffered writes with one commit version
    ///
    /// # Errors
    /// `TransactionNotActive` unless the transaction is Committed.
    pub fn apply_writes<S: Storage>(&self, store: &S, commit_version: u64) -> Result<ApplyResult> {
        if !self.is_committed() {
            return Err(Error::TransactionNotActive {
                state: self.status.to_string(),
            });
        }

        let mut result = ApplyResult {
            commit_version,
            puts_applied: 0,
            deletes_applied: 0,
        };

        for (key, value) in &self.write_set {
            store.put_with_version(key.clone(), value.clone(), commit_version)?;
            result.puts_applied += 1;
        }
        for key in &self.delete_set {
            store.delete_with_version(key, commit_version)?;
            result.deletes_applied += 1;
        }

        Ok(result)
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("deletes", &self.delete_set.len())
            .finish()
    }
}
