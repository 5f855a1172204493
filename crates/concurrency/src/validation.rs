//! Transaction validation for OCC
//!
//! Rules:
//! - First-committer-wins based on the READ set, not the write set
//! - Blind writes (write without read) do not conflict
//! - A key read as absent is recorded with version 0; if it exists at commit
//!   time the transaction conflicts
//! - Read-only transactions always validate

use crate::transaction::TransactionContext;
use entkit_core::error::{Error, Result};
use entkit_core::traits::Storage;
use entkit_core::types::Key;
use std::collections::HashMap;

/// Conflicts detectable at commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Key was read at one version but the current version differs
    ReadWriteConflict {
        /// The key that has a conflict
        key: Key,
        /// Version recorded in read_set when read
        read_version: u64,
        /// Current version in storage at validation time
        current_version: u64,
    },
}

/// Result of transaction validation
///
/// A transaction commits only if `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Successful validation result
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Keys involved in conflicts
    pub fn conflicting_keys(&self) -> Vec<&Key> {
        self.conflicts
            .iter()
            .map(|c| match c {
                ConflictType::ReadWriteConflict { key, .. } => key,
            })
            .collect()
    }
}

/// Validate the read set against current storage state
pub fn validate_read_set<S: Storage>(
    read_set: &HashMap<Key, u64>,
    store: &S,
) -> Result<ValidationResult> {
    let mut result = ValidationResult::ok();

    for (key, read_version) in read_set {
        let current_version = match store.get(key) {
            Ok(Some(vv)) => vv.version,
            Ok(None) => 0,
            Err(e) => {
                return Err(Error::internal(format!(
                    "storage error during read-set validation for {}: {}",
                    key, e
                )));
            }
        };

        if current_version != *read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }

    Ok(result)
}

/// Validate a complete transaction against current storage state
pub fn validate_transaction<S: Storage>(
    txn: &TransactionContext,
    store: &S,
) -> Result<ValidationResult> {
    if txn.is_read_only() {
        return Ok(ValidationResult::ok());
    }
    validate_read_set(&txn.read_set, store)
}
