//! Entity primitives for entkit
//!
//! [`Entities`] is a stateless facade over the Database engine offering the
//! three entity mutation primitives:
//! - **write_in_transaction**: fetch-or-create, merge fields, persist
//! - **increase_counter**: fetch-and-add on a numeric field
//! - **set_status**: precondition-guarded mutation with optional creation,
//!   through the raw store or a [`ValidatedRecord`]
//!
//! ## Design Principle: Stateless Facades
//!
//! `Entities` holds only an `Arc<Database>`. Every call normalizes its key,
//! then runs as one closure under `Database::run_in_transaction`, so a
//! conflicting attempt is discarded and the closure re-runs from scratch.
//! Application errors abort the attempt without writes and are not retried.
//!
//! ## Composing Operations
//!
//! The in-transaction forms ([`writer::write_fields`], [`counter::increment`],
//! [`status::set_status`]) and [`EntityStoreExt`] take a
//! `&mut TransactionContext`, so several of them share one transaction:
//!
//! ```rust,ignore
//! use entkit_engine::primitives::{counter, status, EntityStoreExt};
//!
//! db.run_in_transaction(|txn| {
//!     let seq = counter::increment(txn, &shop, "orders", &Value::Int(1), &Value::Int(1))?;
//!     txn.put_entity(&Entity::with_fields(Key::id("Order", seq.as_int().unwrap_or(0)), [("status", "open")]))
//! })?;
//! ```

pub mod counter;
pub mod extensions;
pub mod record;
pub mod relations;
pub mod schema;
pub mod status;
pub mod writer;

pub use extensions::EntityStoreExt;
pub use record::{SaveOutcome, ValidatedRecord};
pub use relations::{schedule_refresh, RelationEntry, RelationRefresh, RELATION_INDEX_KIND};
pub use schema::{FieldDef, FieldType, Schema, SchemaRecord};
pub use status::{
    CheckProcedure, Create, FieldOp, FieldUpdate, Mutation, Precondition, RecordMut,
    RecordProcedure, StatusUpdate,
};

use crate::database::Database;
use entkit_core::{normalize_key, AnyKey, Entity, Result, Value};
use std::sync::Arc;

/// Entity mutation primitives
///
/// Stateless facade over Database - all state lives in storage.
/// Multiple `Entities` instances on the same Database are safe.
///
/// # Example
///
/// ```ignore
/// let db = Database::ephemeral()?;
/// let entities = Entities::new(db);
///
/// entities.write_in_transaction(Key::id("User", 7), true, [("name", "ada")])?;
/// let ticket = entities.increase_counter("<token>", "next", 1, 1)?;
/// ```
#[derive(Clone)]
pub struct Entities {
    db: Arc<Database>,
}

impl Entities {
    /// Create a new facade over `db`
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Underlying database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Latest committed entity at `key`, or `None`
    pub fn get(&self, key: impl Into<AnyKey>) -> Result<Option<Entity>> {
        let key = normalize_key(key)?;
        self.db.get_entity(&key)
    }

    /// Merge `fields` into the entity at `key`
    ///
    /// A missing entity is created when `create_missing` is set and is
    /// otherwise `NotFound`. Returns the entity as written.
    pub fn write_in_transaction<I, S, V>(
        &self,
        key: impl Into<AnyKey>,
        create_missing: bool,
        fields: I,
    ) -> Result<Entity>
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let key = normalize_key(key)?;
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();

        self.db
            .run_in_transaction(|txn| writer::write_fields(txn, &key, create_missing, &fields))
    }

    /// Add `delta` to counter field `name`, returning the value before the
    /// addition
    ///
    /// The entity and field are created on first use, the field starting at
    /// `start`. Non-numeric `delta` or `start` is `InvalidArgument`.
    pub fn increase_counter(
        &self,
        key: impl Into<AnyKey>,
        name: &str,
        delta: impl Into<Value>,
        start: impl Into<Value>,
    ) -> Result<Value> {
        let key = normalize_key(key)?;
        let delta = delta.into();
        let start = start.into();
        counter::check_numeric("delta", &delta)?;
        counter::check_numeric("start", &start)?;

        self.db
            .run_in_transaction(|txn| counter::increment(txn, &key, name, &delta, &start))
    }

    /// `increase_counter(key, name, 1, 0)`
    pub fn increment(&self, key: impl Into<AnyKey>, name: &str) -> Result<Value> {
        self.increase_counter(key, name, 1, 0)
    }

    /// Status mutation on the raw entity at `key`
    ///
    /// Raw entities carry no relations, so `update_relations` is ignored.
    pub fn set_status(&self, key: impl Into<AnyKey>, update: &StatusUpdate) -> Result<Entity> {
        let key = normalize_key(key)?;
        self.db
            .run_in_transaction(|txn| status::set_status(txn, &key, update))
    }

    /// Status mutation through a validated record
    ///
    /// `template` is cloned for every attempt; the returned record is the
    /// committed one. With `update_relations` a refresh of the record's
    /// referrers is scheduled once the transaction has committed.
    pub fn set_status_record<R: ValidatedRecord>(
        &self,
        key: impl Into<AnyKey>,
        template: &R,
        update: &StatusUpdate,
    ) -> Result<R> {
        let key = normalize_key(key)?;
        let record = self
            .db
            .run_in_transaction(|txn| status::set_status_record(txn, &key, template, update))?;
        if update.wants_relation_refresh() {
            relations::schedule_refresh(&self.db, key);
        }
        Ok(record)
    }
}

impl std::fmt::Debug for Entities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entities").field("db", &self.db).finish()
    }
}
