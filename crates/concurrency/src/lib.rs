//! Concurrency layer for entkit
//!
//! This crate implements optimistic concurrency control (OCC):
//! - TransactionContext: snapshot reads, read-set tracking, buffered writes
//! - Validation: first-committer-wins on the read set
//! - TransactionManager: serialized validate, allocate, apply, publish

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{ApplyResult, CommitError, PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{validate_read_set, validate_transaction, ConflictType, ValidationResult};
