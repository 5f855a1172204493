//! Storage layer for entkit
//!
//! This crate implements the in-memory versioned store:
//! - ShardedStore: DashMap sharded by entity kind, FxHashMap within
//! - VersionChain: per-key MVCC history, newest first, with tombstones
//! - ShardedSnapshot: version-bounded, read-cached view
//!
//! Commit versions are assigned by the transaction layer; the store only
//! records them and publishes the highest one once a commit is applied.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sharded;
pub mod stored_value;

pub use sharded::{Shard, ShardedSnapshot, ShardedStore, VersionChain};
pub use stored_value::StoredValue;
