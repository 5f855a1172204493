//! Entity: a keyed mapping of field name to value
//!
//! Entities are stored as `Value::Object` under their key. Field iteration
//! order is the sorted field name order.

use crate::error::{Error, Result};
use crate::traits::FieldAccess;
use crate::types::Key;
use crate::value::Value;
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

/// A stored record addressed by exactly one key
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    key: Key,
    fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Empty entity bound to `key`
    pub fn new(key: Key) -> Self {
        Self {
            key,
            fields: BTreeMap::new(),
        }
    }

    /// Entity with initial fields
    pub fn with_fields<I, S, V>(key: Key, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        Self {
            key,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Key of this entity
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, returning the previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Whether the field is present
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the entity has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in name order
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Field map
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Storage representation
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>(),
        )
    }

    /// Rebuild from a stored `Value::Object`
    pub fn from_value(key: Key, value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                key,
                fields: map.into_iter().collect(),
            }),
            other => Err(Error::Serialization(format!(
                "entity {} stored as {}, expected Object",
                key,
                other.type_name()
            ))),
        }
    }
}

impl FieldAccess for Entity {
    fn key(&self) -> &Key {
        &self.key
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.fields.insert(name.to_string(), value);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Entity {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
