//! entkit - transactional mutation primitives for key-addressed entities
//!
//! Entities are field mappings addressed by hierarchical keys. Three
//! primitives mutate them, each as one optimistic transaction that is
//! transparently re-run on conflict:
//!
//! - **write_in_transaction**: fetch-or-create, merge, persist
//! - **increase_counter**: fetch-and-add returning the previous value
//! - **set_status**: precondition-guarded mutation with optional creation,
//!   on the raw entity or through a validated record
//!
//! # Quick Start
//!
//! ```ignore
//! use entkit::prelude::*;
//!
//! let db = Database::ephemeral()?;
//! let entities = Entities::new(db);
//! let order = Key::id("Order", 42);
//!
//! entities.write_in_transaction(&order, true, [("status", "open")])?;
//!
//! let update = StatusUpdate::new(Mutation::fields([("status", "paid")])?)
//!     .precondition(Precondition::fields([("status", "open")]));
//! entities.set_status(&order, &update)?;
//! ```
//!
//! # Architecture
//!
//! - `entkit-core`: keys, values, entities, errors, storage traits
//! - `entkit-storage`: sharded in-memory MVCC store
//! - `entkit-concurrency`: OCC transaction context and manager
//! - `entkit-engine`: database, retry, config, background jobs, primitives

pub use entkit_core::{
    normalize_key, AnyKey, Entity, Error, FieldAccess, Key, KeyError, KeyId, Result, Value,
};
pub use entkit_concurrency::TransactionContext;
pub use entkit_engine::*;
pub use entkit_storage::ShardedStore;

/// Everything needed for everyday use
pub mod prelude {
    pub use entkit_core::{normalize_key, Entity, Error, FieldAccess, Key, Result, Value};
    pub use entkit_engine::{
        Create, Database, Entities, EntityStoreExt, Mutation, Precondition, StatusUpdate,
    };
}
