//! Entity operations on a [`TransactionContext`]
//!
//! Lets several entity reads and writes share one transaction:
//!
//! ```rust,ignore
//! use entkit_engine::primitives::extensions::EntityStoreExt;
//!
//! db.run_in_transaction(|txn| {
//!     let mut order = txn.get_entity(&order_key)?.unwrap_or_else(|| Entity::new(order_key.clone()));
//!     order.set("status", "paid");
//!     txn.put_entity(&order)?;
//!     txn.delete_entity(&cart_key)
//! })?;
//! ```

use entkit_concurrency::TransactionContext;
use entkit_core::{Entity, Key, Result};

/// Entity get/put/delete within a transaction
pub trait EntityStoreExt {
    /// Load the entity at `key` as seen by this transaction
    fn get_entity(&mut self, key: &Key) -> Result<Option<Entity>>;

    /// Buffer an upsert of `entity`
    fn put_entity(&mut self, entity: &Entity) -> Result<()>;

    /// Buffer a delete of `key`
    fn delete_entity(&mut self, key: &Key) -> Result<()>;

    /// Every entity of `kind` visible to this transaction, in key order
    fn scan_entities(&mut self, kind: &str) -> Result<Vec<Entity>>;

    /// Entities of `kind` whose key sits below `ancestor`, in key order
    fn scan_entities_under(&mut self, kind: &str, ancestor: &Key) -> Result<Vec<Entity>>;
}

impl EntityStoreExt for TransactionContext {
    fn get_entity(&mut self, key: &Key) -> Result<Option<Entity>> {
        match self.get(key)? {
            Some(value) => Ok(Some(Entity::from_value(key.clone(), value)?)),
            None => Ok(None),
        }
    }

    fn put_entity(&mut self, entity: &Entity) -> Result<()> {
        self.put(entity.key().clone(), entity.to_value())
    }

    fn delete_entity(&mut self, key: &Key) -> Result<()> {
        self.delete(key.clone())
    }

    fn scan_entities(&mut self, kind: &str) -> Result<Vec<Entity>> {
        self.scan_kind(kind)?
            .into_iter()
            .map(|(key, value)| Entity::from_value(key, value))
            .collect()
    }

    fn scan_entities_under(&mut self, kind: &str, ancestor: &Key) -> Result<Vec<Entity>> {
        self.scan_descendants(kind, ancestor)?
            .into_iter()
            .map(|(key, value)| Entity::from_value(key, value))
            .collect()
    }
}
