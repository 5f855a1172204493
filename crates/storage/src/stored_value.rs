//! Storage-layer value wrapper with tombstone support
//!
//! `VersionedValue` is what callers see. `StoredValue` adds the deletion
//! marker, which is a storage concern: a tombstone shadows older versions
//! for snapshots taken after the delete while leaving them readable for
//! snapshots taken before.

use entkit_core::{Value, VersionedValue};

/// A stored version of a key, live or deleted
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    inner: VersionedValue,
    tombstone: bool,
}

impl StoredValue {
    /// Live value written at `version`
    pub fn new(value: Value, version: u64) -> Self {
        StoredValue {
            inner: VersionedValue::new(value, version),
            tombstone: false,
        }
    }

    /// Deletion marker written at `version`
    pub fn tombstone(version: u64) -> Self {
        StoredValue {
            inner: VersionedValue::new(Value::Null, version),
            tombstone: true,
        }
    }

    /// Get the inner VersionedValue
    #[inline]
    pub fn versioned(&self) -> &VersionedValue {
        &self.inner
    }

    /// The value, `None` for tombstones
    #[inline]
    pub fn live(&self) -> Option<&VersionedValue> {
        if self.tombstone {
            None
        } else {
            Some(&self.inner)
        }
    }

    /// Get the value
    #[inline]
    pub fn value(&self) -> &Value {
        &self.inner.value
    }

    /// Get the version
    #[inline]
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// Whether this version marks a delete
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }
}
