//! Conditional status mutation
//!
//! One call runs, inside a single transaction attempt:
//!
//! ```text
//! load -> (missing and create disabled: NotFound)
//!      -> create (missing only)
//!      -> precondition
//!      -> apply values
//!      -> persist
//! ```
//!
//! Loading, assignment and persistence go through a [`Strategy`]: the raw
//! store writes the entity as is, the validated strategy hands the record
//! to a [`ValidatedRecord`] that type-checks, maintains relations and may
//! refuse to save.

use super::counter::{add_checked, sub_checked};
use super::extensions::EntityStoreExt;
use super::record::{SaveOutcome, ValidatedRecord};
use entkit_concurrency::TransactionContext;
use entkit_core::{Entity, Error, FieldAccess, Key, Result, Value};
use std::fmt;
use std::sync::Arc;

/// Procedure that mutates a record
pub type RecordProcedure = Arc<dyn Fn(&mut RecordMut<'_>) -> Result<()> + Send + Sync>;

/// Procedure that checks a record and fails if it does not qualify
pub type CheckProcedure = Arc<dyn Fn(&dyn FieldAccess) -> Result<()> + Send + Sync>;

// a strategy-bound record, erased so procedures need no type parameters
trait RecordSlot {
    fn key(&self) -> &Key;
    fn field(&self, name: &str) -> Option<&Value>;
    fn assign(&mut self, txn: &mut TransactionContext, name: &str, value: Value) -> Result<()>;
}

struct Bound<'s, S: Strategy> {
    strategy: &'s S,
    record: &'s mut S::Record,
}

impl<S: Strategy> RecordSlot for Bound<'_, S> {
    fn key(&self) -> &Key {
        self.record.key()
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.record.field(name)
    }

    fn assign(&mut self, txn: &mut TransactionContext, name: &str, value: Value) -> Result<()> {
        self.strategy.assign(txn, self.record, name, value)
    }
}

/// Record handed to create and mutation procedures
///
/// Writes go through the same path as mapping assignments, so on a
/// validated record a relation field is resolved and copied like any
/// `values` entry.
pub struct RecordMut<'a> {
    slot: &'a mut dyn RecordSlot,
    txn: &'a mut TransactionContext,
}

impl RecordMut<'_> {
    /// Key of the record
    pub fn key(&self) -> &Key {
        self.slot.key()
    }

    /// Current value of `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slot.field(name)
    }

    /// Assign `name`; relation fields of a validated record point at the
    /// entity named by `value`
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.slot.assign(self.txn, name, value.into())
    }

    /// The enclosing transaction, for reading other entities
    pub fn transaction(&mut self) -> &mut TransactionContext {
        self.txn
    }
}

impl FieldAccess for RecordMut<'_> {
    fn key(&self) -> &Key {
        self.slot.key()
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.slot.field(name)
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.slot.assign(self.txn, name, value)
    }
}

impl fmt::Debug for RecordMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMut").field("key", self.key()).finish()
    }
}

/// Operation of a [`FieldUpdate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Replace the value
    Assign,
    /// Add to the current numeric value (`+field`)
    Increment,
    /// Subtract from the current numeric value (`-field`)
    Decrement,
}

/// One field change
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Target field, without prefix
    pub field: String,
    /// What to do with `value`
    pub op: FieldOp,
    /// Operand
    pub value: Value,
}

impl FieldUpdate {
    /// `field = value`
    pub fn assign(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Assign,
            value: value.into(),
        }
    }

    /// `field += value`
    pub fn increment(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Increment,
            value: value.into(),
        }
    }

    /// `field -= value`
    pub fn decrement(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Decrement,
            value: value.into(),
        }
    }

    /// Parse the prefixed form: `+name` increments, `-name` decrements,
    /// anything else assigns
    pub fn parse(name: &str, value: impl Into<Value>) -> Result<Self> {
        let (op, field) = match name.as_bytes().first() {
            Some(b'+') => (FieldOp::Increment, &name[1..]),
            Some(b'-') => (FieldOp::Decrement, &name[1..]),
            _ => (FieldOp::Assign, name),
        };
        if field.is_empty() {
            return Err(Error::invalid_argument(format!(
                "invalid field name {:?}",
                name
            )));
        }
        Ok(Self {
            field: field.to_string(),
            op,
            value: value.into(),
        })
    }

    /// The prefixed form accepted by [`FieldUpdate::parse`]
    pub fn prefixed_name(&self) -> String {
        match self.op {
            FieldOp::Assign => self.field.clone(),
            FieldOp::Increment => format!("+{}", self.field),
            FieldOp::Decrement => format!("-{}", self.field),
        }
    }
}

fn collect_fields<I, S, V>(fields: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (S, V)>,
    S: Into<String>,
    V: Into<Value>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// Value::Object is unordered; sort so dynamic input applies deterministically
fn object_fields(what: &str, value: Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(fields)
        }
        other => Err(Error::invalid_argument(format!(
            "'{}' must be a mapping or a procedure, got {}",
            what,
            other.type_name()
        ))),
    }
}

/// What to change on the record
#[derive(Clone)]
pub enum Mutation {
    /// Ordered field updates
    Fields(Vec<FieldUpdate>),
    /// Arbitrary change to the record
    Procedure(RecordProcedure),
}

impl Mutation {
    /// From `(name, value)` pairs in the prefixed form
    pub fn fields<I, S, V>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        fields
            .into_iter()
            .map(|(name, value)| FieldUpdate::parse(name.as_ref(), value))
            .collect::<Result<Vec<_>>>()
            .map(Mutation::Fields)
    }

    /// From already-parsed updates
    pub fn updates(updates: Vec<FieldUpdate>) -> Self {
        Mutation::Fields(updates)
    }

    /// From a procedure
    pub fn procedure<F>(f: F) -> Self
    where
        F: Fn(&mut RecordMut<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Mutation::Procedure(Arc::new(f))
    }

    /// From a dynamic value, which must be an object in the prefixed form
    ///
    /// Object entries apply in name order.
    pub fn from_value(value: Value) -> Result<Self> {
        Self::fields(object_fields("values", value)?)
    }
}

/// Check run before the values are applied
#[derive(Clone)]
pub enum Precondition {
    /// Every field must equal its expected value
    Fields(Vec<(String, Value)>),
    /// Custom check
    Procedure(CheckProcedure),
}

impl Precondition {
    /// From expected `(field, value)` pairs
    pub fn fields<I, S, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        Precondition::Fields(collect_fields(fields))
    }

    /// From a check procedure
    pub fn procedure<F>(f: F) -> Self
    where
        F: Fn(&dyn FieldAccess) -> Result<()> + Send + Sync + 'static,
    {
        Precondition::Procedure(Arc::new(f))
    }

    /// From a dynamic value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        object_fields("precondition", value).map(Precondition::Fields)
    }

    fn check(&self, record: &dyn FieldAccess) -> Result<()> {
        match self {
            Precondition::Fields(expected) => {
                for (field, want) in expected {
                    let actual = record.field(field);
                    // a missing field reads as null
                    let matches = match actual {
                        Some(value) => value == want,
                        None => want.is_null(),
                    };
                    if !matches {
                        return Err(Error::PreconditionFailed {
                            field: field.clone(),
                            expected: want.clone(),
                            actual: actual.cloned(),
                        });
                    }
                }
                Ok(())
            }
            Precondition::Procedure(f) => f(record),
        }
    }
}

/// What to do when the record does not exist
#[derive(Clone, Default)]
pub enum Create {
    /// Fail with `NotFound`
    #[default]
    Disabled,
    /// Create it with no fields set
    Empty,
    /// Create it and assign these fields
    Fields(Vec<(String, Value)>),
    /// Create it and run this procedure on it
    Procedure(RecordProcedure),
}

impl Create {
    /// From initial `(field, value)` pairs
    pub fn fields<I, S, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        Create::Fields(collect_fields(fields))
    }

    /// From an initializer procedure
    pub fn procedure<F>(f: F) -> Self
    where
        F: Fn(&mut RecordMut<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Create::Procedure(Arc::new(f))
    }

    /// From a dynamic value: `false`/null disable, `true` creates empty, an
    /// object supplies initial fields
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Create::Disabled),
            Value::Bool(true) => Ok(Create::Empty),
            other => object_fields("create", other).map(Create::Fields),
        }
    }

    /// True unless `Disabled`
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Create::Disabled)
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Fields(updates) => f.debug_tuple("Fields").field(updates).finish(),
            Mutation::Procedure(_) => f.write_str("Procedure(..)"),
        }
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Precondition::Procedure(_) => f.write_str("Procedure(..)"),
        }
    }
}

impl fmt::Debug for Create {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Create::Disabled => f.write_str("Disabled"),
            Create::Empty => f.write_str("Empty"),
            Create::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Create::Procedure(_) => f.write_str("Procedure(..)"),
        }
    }
}

/// Parameters of one status mutation
///
/// ```rust,ignore
/// let update = StatusUpdate::new(Mutation::fields([("status", Value::from("shipped")), ("+shipments", Value::Int(1))])?)
///     .precondition(Precondition::fields([("status", "paid")]))
///     .create(Create::Disabled);
/// entities.set_status(&order_key, &update)?;
/// ```
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    values: Mutation,
    precondition: Option<Precondition>,
    create: Create,
    update_relations: bool,
}

impl StatusUpdate {
    /// Apply `values`; no precondition, no creation, no relation refresh
    pub fn new(values: Mutation) -> Self {
        Self {
            values,
            precondition: None,
            create: Create::Disabled,
            update_relations: false,
        }
    }

    /// From a dynamic `values` object, rejecting any other shape
    pub fn from_value(values: Value) -> Result<Self> {
        Mutation::from_value(values).map(Self::new)
    }

    /// Require `precondition` to hold first
    pub fn precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    /// Creation behaviour for a missing record
    pub fn create(mut self, create: Create) -> Self {
        self.create = create;
        self
    }

    /// Schedule a relation refresh of the record's referrers after commit
    ///
    /// Only validated records carry relations; the raw store ignores it.
    pub fn update_relations(mut self, update_relations: bool) -> Self {
        self.update_relations = update_relations;
        self
    }

    /// The values to apply
    pub fn values(&self) -> &Mutation {
        &self.values
    }

    /// Whether a relation refresh is requested
    pub fn wants_relation_refresh(&self) -> bool {
        self.update_relations
    }
}

/// How records are loaded, assigned and persisted
pub(crate) trait Strategy {
    type Record: FieldAccess;

    /// The record at `key` and whether it exists
    fn load(&self, txn: &mut TransactionContext, key: &Key) -> Result<(Self::Record, bool)>;

    /// Plain assignment from a mapping
    fn assign(
        &self,
        txn: &mut TransactionContext,
        record: &mut Self::Record,
        field: &str,
        value: Value,
    ) -> Result<()>;

    fn persist(&self, txn: &mut TransactionContext, record: &mut Self::Record) -> Result<()>;
}

/// Entities read and upserted directly
pub(crate) struct RawStore;

impl Strategy for RawStore {
    type Record = Entity;

    fn load(&self, txn: &mut TransactionContext, key: &Key) -> Result<(Entity, bool)> {
        Ok(match txn.get_entity(key)? {
            Some(entity) => (entity, true),
            None => (Entity::new(key.clone()), false),
        })
    }

    fn assign(
        &self,
        _txn: &mut TransactionContext,
        record: &mut Entity,
        field: &str,
        value: Value,
    ) -> Result<()> {
        record.set_field(field, value)
    }

    fn persist(&self, txn: &mut TransactionContext, record: &mut Entity) -> Result<()> {
        txn.put_entity(record)
    }
}

/// Records cloned from a template and saved through [`ValidatedRecord`]
pub(crate) struct Validated<'a, R> {
    template: &'a R,
}

impl<'a, R: ValidatedRecord> Validated<'a, R> {
    pub(crate) fn new(template: &'a R) -> Self {
        Self { template }
    }
}

impl<R: ValidatedRecord> Strategy for Validated<'_, R> {
    type Record = R;

    fn load(&self, txn: &mut TransactionContext, key: &Key) -> Result<(R, bool)> {
        let mut record = self.template.clone();
        let exists = record.load(txn, key)?;
        Ok((record, exists))
    }

    fn assign(
        &self,
        txn: &mut TransactionContext,
        record: &mut R,
        field: &str,
        value: Value,
    ) -> Result<()> {
        if record.is_relation(field) {
            record.set_relation(txn, field, value)
        } else {
            record.set_field(field, value)
        }
    }

    fn persist(&self, txn: &mut TransactionContext, record: &mut R) -> Result<()> {
        match record.save(txn)? {
            SaveOutcome::Saved => Ok(()),
            SaveOutcome::Rejected(reasons) => Err(Error::PersistenceFailed {
                key: record.key().clone(),
                reason: reasons.join("; "),
            }),
        }
    }
}

fn apply_update<S: Strategy>(
    txn: &mut TransactionContext,
    strategy: &S,
    record: &mut S::Record,
    update: &FieldUpdate,
) -> Result<()> {
    let field = update.field.as_str();
    let combined = match update.op {
        FieldOp::Assign => return strategy.assign(txn, record, field, update.value.clone()),
        FieldOp::Increment | FieldOp::Decrement => {
            let current = record
                .field(field)
                .ok_or_else(|| Error::wrong_type(field, "numeric", "missing"))?;
            if update.op == FieldOp::Increment {
                add_checked(field, current, &update.value)?
            } else {
                sub_checked(field, current, &update.value)?
            }
        }
    };
    record.set_field(field, combined)
}

fn run_procedure<S: Strategy>(
    txn: &mut TransactionContext,
    strategy: &S,
    record: &mut S::Record,
    procedure: &RecordProcedure,
) -> Result<()> {
    let mut slot = Bound { strategy, record };
    let mut handle = RecordMut {
        slot: &mut slot,
        txn,
    };
    procedure(&mut handle)
}

/// Run the load/create/check/apply/persist sequence inside `txn`
pub(crate) fn apply_status<S: Strategy>(
    txn: &mut TransactionContext,
    strategy: &S,
    key: &Key,
    update: &StatusUpdate,
) -> Result<S::Record> {
    let (mut record, exists) = strategy.load(txn, key)?;

    if !exists {
        match &update.create {
            Create::Disabled => return Err(Error::not_found(key.clone())),
            Create::Empty => {}
            Create::Fields(fields) => {
                for (field, value) in fields {
                    strategy.assign(txn, &mut record, field, value.clone())?;
                }
            }
            Create::Procedure(init) => run_procedure(txn, strategy, &mut record, init)?,
        }
    }

    if let Some(precondition) = &update.precondition {
        precondition.check(&record)?;
    }

    match &update.values {
        Mutation::Fields(updates) => {
            for field_update in updates {
                apply_update(txn, strategy, &mut record, field_update)?;
            }
        }
        Mutation::Procedure(mutate) => run_procedure(txn, strategy, &mut record, mutate)?,
    }

    strategy.persist(txn, &mut record)?;
    Ok(record)
}

/// Status mutation on the raw entity at `key`, inside `txn`
pub fn set_status(txn: &mut TransactionContext, key: &Key, update: &StatusUpdate) -> Result<Entity> {
    apply_status(txn, &RawStore, key, update)
}

/// Status mutation through a validated record, inside `txn`
///
/// `template` is cloned for the attempt and left untouched.
pub fn set_status_record<R: ValidatedRecord>(
    txn: &mut TransactionContext,
    key: &Key,
    template: &R,
    update: &StatusUpdate,
) -> Result<R> {
    apply_status(txn, &Validated::new(template), key, update)
}
