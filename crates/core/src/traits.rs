//! Core traits for storage, snapshots and field access
//!
//! Storage and SnapshotView decouple the transaction layer from the concrete
//! versioned store. FieldAccess is the narrow surface mutation procedures and
//! the status engine use to read and write fields on either a raw entity or
//! a validated record.

use crate::error::Result;
use crate::types::{Key, VersionedValue};
use crate::value::Value;

/// Versioned storage backend
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Storage: Send + Sync {
    /// Get the latest live value for key
    ///
    /// Returns None if the key doesn't exist or its newest version is a
    /// tombstone.
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>>;

    /// Get the newest live value at or before `max_version`
    fn get_versioned(&self, key: &Key, max_version: u64) -> Result<Option<VersionedValue>>;

    /// Write a value with an explicit commit version
    ///
    /// Does not allocate a version and does not advance `current_version`;
    /// the committer publishes the version once all writes are applied.
    fn put_with_version(&self, key: Key, value: Value, version: u64) -> Result<()>;

    /// Record a tombstone for key at `version`
    ///
    /// Returns the value that was live before the delete, if any.
    fn delete_with_version(&self, key: &Key, version: u64) -> Result<Option<VersionedValue>>;

    /// All live entries of one kind at or before `max_version`, in key order
    fn scan_kind(&self, kind: &str, max_version: u64) -> Result<Vec<(Key, VersionedValue)>>;

    /// Live entries of `kind` below `ancestor` at or before `max_version`,
    /// in key order
    fn scan_descendants(
        &self,
        kind: &str,
        ancestor: &Key,
        max_version: u64,
    ) -> Result<Vec<(Key, VersionedValue)>>;

    /// Highest published commit version
    fn current_version(&self) -> u64;

    /// Publish `version` as visible to new snapshots
    ///
    /// Never moves the version backwards.
    fn publish_version(&self, version: u64);
}

/// Version-bounded read view of storage
pub trait SnapshotView: Send + Sync {
    /// Value as it existed at the snapshot version
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>>;

    /// Live entries of one kind as of the snapshot version
    fn scan_kind(&self, kind: &str) -> Result<Vec<(Key, VersionedValue)>>;

    /// Live entries of `kind` below `ancestor` as of the snapshot version
    fn scan_descendants(&self, kind: &str, ancestor: &Key) -> Result<Vec<(Key, VersionedValue)>>;

    /// Version this snapshot was taken at
    fn version(&self) -> u64;
}

/// Field-level access to a keyed record
///
/// Implemented by [`crate::entity::Entity`] and by validated record types.
/// Mutation and precondition procedures receive `&mut dyn FieldAccess`.
pub trait FieldAccess {
    /// Key of the record
    fn key(&self) -> &Key;

    /// Current value of a field, `None` when absent
    fn field(&self, name: &str) -> Option<&Value>;

    /// Assign a field
    ///
    /// Typed records may reject the value with `WrongType` or
    /// `InvalidArgument`.
    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;
}
