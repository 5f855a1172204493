//! Sharded in-memory MVCC store
//!
//! # Design
//!
//! - DashMap keyed by entity kind: writes to different kinds never contend
//! - FxHashMap within a shard: O(1) lookups, fast non-crypto hash
//! - VersionChain per key: newest first, tombstones for deletes
//!
//! # Version Handling
//!
//! The store never allocates versions. The transaction manager applies all
//! writes of a commit with one version and then calls `publish_version`.
//! Snapshots read `version` once, so a half-applied commit is never visible
//! to a snapshot taken during the apply.

use dashmap::DashMap;
use entkit_core::error::Result;
use entkit_core::traits::{SnapshotView, Storage};
use entkit_core::types::Key;
use entkit_core::value::Value;
use entkit_core::VersionedValue;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::stored_value::StoredValue;

/// Version chain for MVCC
///
/// Versions are stored in descending order (newest first) so snapshot reads
/// stop at the first version `<= snapshot_version`.
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: VecDeque<StoredValue>,
}

impl VersionChain {
    /// Create a new version chain with a single version
    pub fn new(value: StoredValue) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front(value);
        Self { versions }
    }

    /// Add a new version (must be newer than existing versions)
    #[inline]
    pub fn push(&mut self, value: StoredValue) {
        debug_assert!(
            self.versions
                .front()
                .map_or(true, |newest| newest.version() <= value.version()),
            "version chain must grow newest-first"
        );
        self.versions.push_front(value);
    }

    /// Version at or before `max_version`, tombstones included
    pub fn get_at_version(&self, max_version: u64) -> Option<&StoredValue> {
        self.versions.iter().find(|sv| sv.version() <= max_version)
    }

    /// Newest version
    #[inline]
    pub fn latest(&self) -> Option<&StoredValue> {
        self.versions.front()
    }

    /// Drop versions no read at or after `min_version` can see
    ///
    /// The newest version `<= min_version` stays, so reads at the horizon
    /// are unaffected.
    pub fn gc(&mut self, min_version: u64) {
        while self.versions.len() > 1 {
            // the next-oldest shadows the oldest from min_version on
            let shadowed = self
                .versions
                .get(self.versions.len() - 2)
                .map_or(false, |next| next.version() <= min_version);
            if !shadowed {
                break;
            }
            self.versions.pop_back();
        }
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

/// Per-kind shard
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) data: FxHashMap<Key, VersionChain>,
}

impl Shard {
    /// Create a new empty shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys (live or deleted) in this shard
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if shard is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sharded storage - DashMap by kind, FxHashMap within
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use entkit_core::{Key, Storage, SnapshotView, Value};
/// use entkit_storage::ShardedStore;
///
/// let store = Arc::new(ShardedStore::new());
/// store.put_with_version(Key::id("User", 1), Value::Int(1), 1).unwrap();
/// store.publish_version(1);
///
/// let snapshot = store.snapshot();
/// assert!(snapshot.get(&Key::id("User", 1)).unwrap().is_some());
/// ```
pub struct ShardedStore {
    shards: DashMap<String, Shard>,
    version: AtomicU64,
}

impl ShardedStore {
    /// Create new sharded store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Get current published version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of shards (kinds)
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total keys across all shards, tombstoned keys included
    pub fn total_entries(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }

    fn push_version(&self, key: Key, value: StoredValue) {
        let mut shard = self.shards.entry(key.kind().to_string()).or_default();
        if let Some(chain) = shard.data.get_mut(&key) {
            chain.push(value);
        } else {
            shard.data.insert(key, VersionChain::new(value));
        }
    }

    fn read_at(&self, key: &Key, max_version: u64) -> Option<VersionedValue> {
        self.shards.get(key.kind()).and_then(|shard| {
            shard
                .data
                .get(key)
                .and_then(|chain| chain.get_at_version(max_version))
                .and_then(|sv| sv.live().cloned())
        })
    }

    fn scan_at(
        &self,
        kind: &str,
        ancestor: Option<&Key>,
        max_version: u64,
    ) -> Vec<(Key, VersionedValue)> {
        let mut results: Vec<_> = self
            .shards
            .get(kind)
            .map(|shard| {
                shard
                    .data
                    .iter()
                    .filter(|(k, _)| ancestor.map_or(true, |a| k.is_descendant_of(a)))
                    .filter_map(|(k, chain)| {
                        chain
                            .get_at_version(max_version)
                            .and_then(|sv| sv.live().cloned())
                            .map(|vv| (k.clone(), vv))
                    })
                    .collect()
            })
            .unwrap_or_default();
        results.sort_by(|(a, _), (b, _)| a.cmp(b));
        results
    }

    /// Drop history older than `min_version` in every chain
    pub fn gc(&self, min_version: u64) {
        for mut shard in self.shards.iter_mut() {
            for chain in shard.data.values_mut() {
                chain.gc(min_version);
            }
        }
    }

    /// Take a snapshot at the current published version
    ///
    /// O(1): one Arc clone and one atomic load.
    #[inline]
    pub fn snapshot(self: &Arc<Self>) -> ShardedSnapshot {
        ShardedSnapshot {
            version: self.version.load(Ordering::Acquire),
            store: Arc::clone(self),
            cache: parking_lot::RwLock::new(FxHashMap::default()),
        }
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shard_count", &self.shard_count())
            .field("version", &self.version())
            .field("total_entries", &self.total_entries())
            .finish()
    }
}

impl Storage for ShardedStore {
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>> {
        Ok(self.shards.get(key.kind()).and_then(|shard| {
            shard
                .data
                .get(key)
                .and_then(|chain| chain.latest())
                .and_then(|sv| sv.live().cloned())
        }))
    }

    fn get_versioned(&self, key: &Key, max_version: u64) -> Result<Option<VersionedValue>> {
        Ok(self.read_at(key, max_version))
    }

    fn put_with_version(&self, key: Key, value: Value, version: u64) -> Result<()> {
        self.push_version(key, StoredValue::new(value, version));
        Ok(())
    }

    fn delete_with_version(&self, key: &Key, version: u64) -> Result<Option<VersionedValue>> {
        let previous = Storage::get(self, key)?;
        if previous.is_some() {
            self.push_version(key.clone(), StoredValue::tombstone(version));
        }
        Ok(previous)
    }

    fn scan_kind(&self, kind: &str, max_version: u64) -> Result<Vec<(Key, VersionedValue)>> {
        Ok(self.scan_at(kind, None, max_version))
    }

    fn scan_descendants(
        &self,
        kind: &str,
        ancestor: &Key,
        max_version: u64,
    ) -> Result<Vec<(Key, VersionedValue)>> {
        Ok(self.scan_at(kind, Some(ancestor), max_version))
    }

    fn current_version(&self) -> u64 {
        self.version()
    }

    fn publish_version(&self, version: u64) {
        self.version.fetch_max(version, Ordering::AcqRel);
    }
}

/// Snapshot of ShardedStore at a point in time
///
/// Reads are filtered to versions `<=` the snapshot version and cached on
/// first read, so repeated reads of a key inside one transaction return the
/// same value even after later commits prune history.
pub struct ShardedSnapshot {
    version: u64,
    store: Arc<ShardedStore>,
    // parking_lot locks don't poison
    cache: parking_lot::RwLock<FxHashMap<Key, Option<VersionedValue>>>,
}

impl Clone for ShardedSnapshot {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            store: Arc::clone(&self.store),
            cache: parking_lot::RwLock::new(self.cache.read().clone()),
        }
    }
}

impl ShardedSnapshot {
    /// Check if a key is live at the snapshot version
    #[inline]
    pub fn contains(&self, key: &Key) -> bool {
        SnapshotView::get(self, key).ok().flatten().is_some()
    }
}

impl std::fmt::Debug for ShardedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedSnapshot")
            .field("version", &self.version)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl SnapshotView for ShardedSnapshot {
    fn get(&self, key: &Key) -> Result<Option<VersionedValue>> {
        {
            let cache = self.cache.read();
            if let Some(cached) = cache.get(key) {
                return Ok(cached.clone());
            }
        }

        let result = self.store.read_at(key, self.version);
        self.cache.write().insert(key.clone(), result.clone());
        Ok(result)
    }

    fn scan_kind(&self, kind: &str) -> Result<Vec<(Key, VersionedValue)>> {
        Ok(self.store.scan_at(kind, None, self.version))
    }

    fn scan_descendants(&self, kind: &str, ancestor: &Key) -> Result<Vec<(Key, VersionedValue)>> {
        Ok(self.store.scan_at(kind, Some(ancestor), self.version))
    }

    fn version(&self) -> u64 {
        self.version
    }
}
