//! Database: storage, transactions and background work in one handle
//!
//! ## Transaction API
//!
//! 1. **Closure API**: `transaction`, `transaction_with_retry`,
//!    `run_in_transaction`
//!    - Commit on `Ok`, abort on `Err`
//!    - The retrying forms re-run the closure from scratch on conflict, so it
//!      must not have side effects outside the transaction
//!
//! 2. **Manual API**: `begin_transaction()` + `commit_transaction()`
//!    - For callers that need to control commit timing

mod builder;
pub mod config;
mod transactions;

pub use builder::DatabaseBuilder;
pub use config::{BackgroundConfig, EngineConfig, CONFIG_FILE_NAME};
pub use transactions::RetryConfig;

use crate::background::BackgroundScheduler;
use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use entkit_concurrency::TransactionContext;
use entkit_core::traits::Storage;
use entkit_core::{Entity, Error, Key, Result};
use entkit_storage::ShardedStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long `shutdown` waits for in-flight transactions.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// In-memory transactional entity database
///
/// Owns the versioned store, the commit coordinator, the background
/// scheduler and the diagnostic sink. Share it as `Arc<Database>`.
///
/// # Example
///
/// ```text
/// let db = Database::ephemeral()?;
/// let n = db.run_in_transaction(|txn| {
///     let v = txn.get(&key)?.and_then(|v| v.as_int()).unwrap_or(0);
///     txn.put(key.clone(), Value::Int(v + 1))?;
///     Ok(v)
/// })?;
/// ```
pub struct Database {
    storage: Arc<ShardedStore>,
    coordinator: TransactionCoordinator,
    config: EngineConfig,
    scheduler: BackgroundScheduler,
    diagnostics: Arc<dyn DiagnosticSink>,
    accepting_transactions: AtomicBool,
}

impl Database {
    /// Builder for a configured database
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Database with default config and the tracing sink
    pub fn ephemeral() -> Result<Arc<Self>> {
        DatabaseBuilder::new().open()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        config.validate()?;
        let scheduler = BackgroundScheduler::new(
            config.background.workers,
            config.background.max_queue_depth,
        )
        .map_err(|e| Error::internal(format!("failed to start background workers: {}", e)))?;

        let storage = Arc::new(ShardedStore::new());
        let coordinator = TransactionCoordinator::new(storage.current_version());

        info!(
            target: "entkit::db",
            workers = config.background.workers,
            max_retries = config.retry.max_retries,
            "database opened"
        );

        Ok(Self {
            storage,
            coordinator,
            config,
            scheduler,
            diagnostics,
            accepting_transactions: AtomicBool::new(true),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Underlying versioned store
    pub fn storage(&self) -> &Arc<ShardedStore> {
        &self.storage
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Background job scheduler
    pub fn scheduler(&self) -> &BackgroundScheduler {
        &self.scheduler
    }

    /// Diagnostic sink shared by every primitive on this database
    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }

    /// Latest published commit version
    pub fn current_version(&self) -> u64 {
        self.storage.current_version()
    }

    /// Transaction lifecycle counts
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// False once `shutdown` has been called
    pub fn is_open(&self) -> bool {
        self.accepting_transactions.load(Ordering::SeqCst)
    }

    /// Latest committed entity at `key`, read outside any transaction
    pub fn get_entity(&self, key: &Key) -> Result<Option<Entity>> {
        match self.storage.get(key)? {
            Some(vv) => Ok(Some(Entity::from_value(key.clone(), vv.value)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Transaction API
    // ========================================================================

    fn check_accepting(&self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::invalid_argument("database is shut down"));
        }
        Ok(())
    }

    /// Commit when the closure succeeded, abort otherwise.
    fn run_single_attempt<T>(&self, txn: &mut TransactionContext, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit_transaction(txn)?;
                Ok(value)
            }
            Err(e) => {
                self.coordinator.abort(txn, format!("closure error: {}", e));
                Err(e)
            }
        }
    }

    /// Run `f` in one transaction, without retry
    ///
    /// A conflict at commit is returned as `Error::Conflict`.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T>,
    {
        self.check_accepting()?;
        let mut txn = self.begin_transaction();
        let result = f(&mut txn);
        self.run_single_attempt(&mut txn, result)
    }

    /// Run `f` in a transaction, re-running it on conflict per `retry`
    ///
    /// Any error other than a conflict is returned immediately. Once the
    /// retries are used up the last conflict is returned.
    pub fn transaction_with_retry<F, T>(&self, retry: &RetryConfig, f: F) -> Result<T>
    where
        F: Fn(&mut TransactionContext) -> Result<T>,
    {
        self.check_accepting()?;
        self.retry_loop(retry, f)
    }

    /// Run `f` with the configured retry policy
    pub fn run_in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: Fn(&mut TransactionContext) -> Result<T>,
    {
        self.transaction_with_retry(&self.config.retry, f)
    }

    /// Like `run_in_transaction`, but still allowed while `shutdown` drains
    /// queued background jobs
    pub(crate) fn run_background<F, T>(&self, f: F) -> Result<T>
    where
        F: Fn(&mut TransactionContext) -> Result<T>,
    {
        self.retry_loop(&self.config.retry, f)
    }

    fn retry_loop<F, T>(&self, retry: &RetryConfig, f: F) -> Result<T>
    where
        F: Fn(&mut TransactionContext) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut txn = self.begin_transaction();
            let result = f(&mut txn);

            match self.run_single_attempt(&mut txn, result) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < retry.max_retries => {
                    attempt += 1;
                    self.diagnostics.report(Diagnostic::ConflictRetry {
                        attempt,
                        reason: e.to_string(),
                    });
                    std::thread::sleep(retry.calculate_delay(attempt - 1));
                }
                Err(e) => {
                    if e.is_conflict() {
                        warn!(target: "entkit::txn", attempts = attempt + 1, "retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Start a transaction for manual commit
    ///
    /// Finish it with `commit_transaction` or `abort_transaction`.
    pub fn begin_transaction(&self) -> TransactionContext {
        self.coordinator.start_transaction(&self.storage)
    }

    /// Validate and apply a manual transaction, returning its commit version
    ///
    /// Read-only transactions return their start version.
    pub fn commit_transaction(&self, txn: &mut TransactionContext) -> Result<u64> {
        self.coordinator.commit(txn, self.storage.as_ref())
    }

    /// Abandon a manual transaction
    pub fn abort_transaction(&self, txn: &mut TransactionContext, reason: impl Into<String>) {
        self.coordinator.abort(txn, reason);
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop accepting transactions, finish queued background jobs, and wait
    /// for in-flight transactions.
    ///
    /// Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        self.accepting_transactions.store(false, Ordering::SeqCst);

        self.scheduler.drain();

        if !self.coordinator.wait_for_idle(SHUTDOWN_TIMEOUT) {
            return Err(Error::internal(format!(
                "{} transactions still active after {:?}",
                self.coordinator.active_count(),
                SHUTDOWN_TIMEOUT
            )));
        }

        self.scheduler.shutdown();
        info!(target: "entkit::db", version = self.current_version(), "database shut down");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("storage", &self.storage)
            .field("coordinator", &self.coordinator)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}
