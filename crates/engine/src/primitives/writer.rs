//! Fetch-or-create, merge, persist

use super::extensions::EntityStoreExt;
use entkit_concurrency::TransactionContext;
use entkit_core::{Entity, Error, Key, Result, Value};

/// Merge `fields` into the entity at `key` inside `txn`
///
/// A missing entity is created empty when `create_missing` is set, otherwise
/// the call fails with `NotFound`. Fields are assigned in order, so a later
/// duplicate wins. Fields not listed are left as they are.
pub fn write_fields(
    txn: &mut TransactionContext,
    key: &Key,
    create_missing: bool,
    fields: &[(String, Value)],
) -> Result<Entity> {
    let mut entity = match txn.get_entity(key)? {
        Some(entity) => entity,
        None if create_missing => Entity::new(key.clone()),
        None => return Err(Error::not_found(key.clone())),
    };

    for (name, value) in fields {
        entity.set(name.clone(), value.clone());
    }

    txn.put_entity(&entity)?;
    Ok(entity)
}
