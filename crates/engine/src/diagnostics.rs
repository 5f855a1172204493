//! Operation-level diagnostics
//!
//! The [`Database`](crate::Database) owns one `Arc<dyn DiagnosticSink>` and
//! every primitive reports through it. [`TracingSink`] forwards to `tracing`
//! and is the default; [`MemorySink`] records events for tests.

use entkit_core::Key;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Something worth reporting that is not a returned error.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A transaction attempt hit a conflict and will be re-run
    ConflictRetry {
        /// 1-based retry number
        attempt: usize,
        /// Conflict message
        reason: String,
    },
    /// Relation refresh job queued after a commit
    RelationRefreshScheduled {
        /// Entity whose referrers will be refreshed
        key: Key,
    },
    /// Relation refresh finished
    RelationRefreshCompleted {
        /// Entity whose referrers were refreshed
        key: Key,
        /// Referring records rewritten
        updated: usize,
    },
    /// Relation refresh could not be queued or failed while running
    RelationRefreshFailed {
        /// Entity whose referrers were being refreshed
        key: Key,
        /// Failure description
        reason: String,
    },
}

/// Receiver for [`Diagnostic`] events.
pub trait DiagnosticSink: Send + Sync {
    /// Record one event
    fn report(&self, event: Diagnostic);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, event: Diagnostic) {
        match event {
            Diagnostic::ConflictRetry { attempt, reason } => {
                debug!(target: "entkit::txn", attempt, %reason, "retrying after conflict");
            }
            Diagnostic::RelationRefreshScheduled { key } => {
                debug!(target: "entkit::relations", %key, "relation refresh scheduled");
            }
            Diagnostic::RelationRefreshCompleted { key, updated } => {
                debug!(target: "entkit::relations", %key, updated, "relation refresh completed");
            }
            Diagnostic::RelationRefreshFailed { key, reason } => {
                warn!(target: "entkit::relations", %key, %reason, "relation refresh failed");
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().clone()
    }

    /// Remove and return everything reported so far
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, event: Diagnostic) {
        self.events.lock().push(event);
    }
}
