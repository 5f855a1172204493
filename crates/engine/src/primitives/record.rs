//! Validated-record persistence contract
//!
//! A validated record sits between the status mutator and the store: it
//! loads itself by key, type-checks field writes, routes relation fields
//! through [`ValidatedRecord::set_relation`], and decides on save whether
//! the record may be written. [`SchemaRecord`](super::schema::SchemaRecord)
//! is the implementation shipped with the engine.

use entkit_concurrency::TransactionContext;
use entkit_core::{FieldAccess, Key, Result, Value};

/// Result of [`ValidatedRecord::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written to the transaction
    Saved,
    /// Nothing written; one message per violated rule
    Rejected(Vec<String>),
}

impl SaveOutcome {
    /// True for `Saved`
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

/// A record with its own load, validation and relation bookkeeping
///
/// Values passed to the status mutator act as templates: each transaction
/// attempt works on a fresh clone, so a retried attempt never sees state
/// from a failed one.
pub trait ValidatedRecord: FieldAccess + Clone {
    /// Bind to `key` and load its stored fields
    ///
    /// Returns false when nothing is stored at `key`; the record is then
    /// bound to `key` with its initial field values.
    fn load(&mut self, txn: &mut TransactionContext, key: &Key) -> Result<bool>;

    /// True when `field` references another entity
    fn is_relation(&self, field: &str) -> bool;

    /// Point relation `field` at the entity named by `value`
    ///
    /// `Value::Null` clears the relation.
    fn set_relation(&mut self, txn: &mut TransactionContext, field: &str, value: Value)
        -> Result<()>;

    /// Validate and, when valid, write the record and its relation index
    fn save(&mut self, txn: &mut TransactionContext) -> Result<SaveOutcome>;
}
