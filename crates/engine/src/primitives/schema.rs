//! Typed schemas and the schema-backed validated record
//!
//! ```rust,ignore
//! let order = Arc::new(
//!     Schema::new("Order")
//!         .field(FieldDef::new("status", FieldType::String).required())
//!         .field(FieldDef::new("items", FieldType::Int).default_value(0))
//!         .field(FieldDef::relation("customer", "Customer", ["name"])),
//! );
//! let record = SchemaRecord::new(order);
//! ```
//!
//! A relation field is stored as `{key: <token>, dest: {<copied fields>}}`,
//! where `dest` holds the listed fields of the referenced entity as they
//! were when the relation was set or last refreshed.

use super::extensions::EntityStoreExt;
use super::record::{SaveOutcome, ValidatedRecord};
use super::relations;
use entkit_concurrency::TransactionContext;
use entkit_core::{Entity, Error, FieldAccess, Key, KeyId, Result, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Type of a schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// `Value::Bool`
    Bool,
    /// `Value::Int`
    Int,
    /// `Value::Float`; ints are widened on assignment
    Float,
    /// `Value::String`
    String,
    /// Reference to an entity of `kind`, carrying a copy of its `copy` fields
    Relation {
        /// Kind of the referenced entity
        kind: String,
        /// Fields copied from the referenced entity
        copy: Vec<String>,
    },
}

impl FieldType {
    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Relation { .. } => "relation",
        }
    }
}

/// One field of a [`Schema`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    name: String,
    ty: FieldType,
    required: bool,
    default: Option<Value>,
}

impl FieldDef {
    /// Optional field without default
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
        }
    }

    /// Relation field to entities of `kind`
    pub fn relation<I, S>(name: impl Into<String>, kind: impl Into<String>, copy: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::Relation {
                kind: kind.into(),
                copy: copy.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Saving fails while the field is missing or null
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value given to new records
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    /// Whether the field is required
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// True for relation fields
    pub fn is_relation(&self) -> bool {
        matches!(self.ty, FieldType::Relation { .. })
    }

    /// Check a non-relation value, widening int to float where declared
    fn check(&self, value: &Value) -> Result<Value> {
        match (&self.ty, value) {
            (FieldType::Bool, Value::Bool(_))
            | (FieldType::Int, Value::Int(_))
            | (FieldType::Float, Value::Float(_))
            | (FieldType::String, Value::String(_)) => Ok(value.clone()),
            (FieldType::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            _ => Err(Error::wrong_type(
                &self.name,
                self.ty.name(),
                value.type_name(),
            )),
        }
    }
}

/// Field definitions for one entity kind
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    kind: String,
    fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    /// Empty schema for `kind`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add or replace a field
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.insert(def.name.clone(), def);
        self
    }

    /// Entity kind
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Definition of `name`
    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// All definitions in name order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    fn def(&self, name: &str) -> Result<&FieldDef> {
        self.get(name).ok_or_else(|| {
            Error::invalid_argument(format!("unknown field '{}' on {}", name, self.kind))
        })
    }
}

/// Validated record backed by a [`Schema`]
#[derive(Debug, Clone)]
pub struct SchemaRecord {
    schema: Arc<Schema>,
    key: Key,
    fields: BTreeMap<String, Value>,
    // relation targets as last loaded or saved, diffed on save
    indexed: BTreeMap<String, Key>,
}

impl SchemaRecord {
    /// Unbound record; `load` binds it to a key
    ///
    /// Until then its key has id 0, which no stored key uses.
    pub fn new(schema: Arc<Schema>) -> Self {
        let key = Key::new(schema.kind(), KeyId::Id(0));
        let mut record = Self {
            schema,
            key,
            fields: BTreeMap::new(),
            indexed: BTreeMap::new(),
        };
        record.apply_defaults();
        record
    }

    /// Schema of this record
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Key the relation `field` currently points at
    pub fn relation_target(&self, field: &str) -> Result<Option<Key>> {
        match self.fields.get(field) {
            Some(value) => relations::relation_target(value),
            None => Ok(None),
        }
    }

    /// Snapshot of the stored form
    pub fn to_entity(&self) -> Entity {
        Entity::with_fields(self.key.clone(), self.fields.clone())
    }

    /// Rule violations, empty when the record may be saved
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for def in self.schema.fields() {
            match self.fields.get(def.name()) {
                None | Some(Value::Null) => {
                    if def.is_required() {
                        errors.push(format!("field '{}' is required", def.name()));
                    }
                }
                Some(value) if def.is_relation() => {
                    if let Err(e) = relations::relation_target(value) {
                        errors.push(format!("field '{}': {}", def.name(), e));
                    }
                }
                Some(value) => {
                    if let Err(e) = def.check(value) {
                        errors.push(e.to_string());
                    }
                }
            }
        }
        errors
    }

    fn apply_defaults(&mut self) {
        for def in self.schema.fields.values() {
            if let Some(default) = &def.default {
                self.fields.insert(def.name.clone(), default.clone());
            }
        }
    }

    fn relation_fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.schema.fields().filter_map(|def| match &def.ty {
            FieldType::Relation { copy, .. } => Some((def.name(), copy.as_slice())),
            _ => None,
        })
    }
}

impl FieldAccess for SchemaRecord {
    fn key(&self) -> &Key {
        &self.key
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        let def = self.schema.def(name)?;
        if def.is_relation() {
            return Err(Error::invalid_argument(format!(
                "relation field '{}' must be set through set_relation",
                name
            )));
        }
        if value.is_null() {
            self.fields.remove(name);
            return Ok(());
        }
        let checked = def.check(&value)?;
        self.fields.insert(name.to_string(), checked);
        Ok(())
    }
}

impl ValidatedRecord for SchemaRecord {
    fn load(&mut self, txn: &mut TransactionContext, key: &Key) -> Result<bool> {
        if key.kind() != self.schema.kind() {
            return Err(Error::invalid_argument(format!(
                "key {} does not match schema kind {}",
                key,
                self.schema.kind()
            )));
        }

        self.key = key.clone();
        self.fields.clear();
        self.indexed.clear();

        match txn.get_entity(key)? {
            Some(entity) => {
                self.fields = entity.fields().clone();
                let targets: Vec<(String, Key)> = self
                    .relation_fields()
                    .filter_map(|(name, _)| {
                        let target = self.relation_target(name).ok().flatten()?;
                        Some((name.to_string(), target))
                    })
                    .collect();
                self.indexed.extend(targets);
                Ok(true)
            }
            None => {
                self.apply_defaults();
                Ok(false)
            }
        }
    }

    fn is_relation(&self, field: &str) -> bool {
        self.schema.get(field).map_or(false, FieldDef::is_relation)
    }

    fn set_relation(
        &mut self,
        txn: &mut TransactionContext,
        field: &str,
        value: Value,
    ) -> Result<()> {
        let def = self.schema.def(field)?;
        let (kind, copy) = match &def.ty {
            FieldType::Relation { kind, copy } => (kind, copy),
            other => {
                return Err(Error::wrong_type(field, "relation", other.name()));
            }
        };

        if value.is_null() {
            self.fields.remove(field);
            return Ok(());
        }

        let target = relations::target_from_input(value)?;
        if target.kind() != kind {
            return Err(Error::invalid_argument(format!(
                "relation '{}' expects {}, got {}",
                field,
                kind,
                target.kind()
            )));
        }
        let referenced = txn.get_entity(&target)?.ok_or_else(|| {
            Error::invalid_argument(format!(
                "relation '{}' points at missing entity {}",
                field, target
            ))
        })?;

        let stored = relations::relation_value(&target, relations::copy_fields(&referenced, copy))?;
        self.fields.insert(field.to_string(), stored);
        Ok(())
    }

    fn save(&mut self, txn: &mut TransactionContext) -> Result<SaveOutcome> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Ok(SaveOutcome::Rejected(errors));
        }

        txn.put_entity(&self.to_entity())?;

        let mut current = BTreeMap::new();
        for (name, copy) in self.relation_fields() {
            let new_target = self.relation_target(name)?;
            let old_target = self.indexed.get(name);
            if old_target != new_target.as_ref() {
                if let Some(old) = old_target {
                    relations::remove_index(txn, old, &self.key, name)?;
                }
                if let Some(new) = &new_target {
                    relations::add_index(txn, new, &self.key, name, copy)?;
                }
            }
            if let Some(target) = new_target {
                current.insert(name.to_string(), target);
            }
        }
        self.indexed = current;

        Ok(SaveOutcome::Saved)
    }
}
