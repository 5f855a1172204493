//! Fetch-and-add on a numeric entity field

use super::extensions::EntityStoreExt;
use entkit_concurrency::TransactionContext;
use entkit_core::{Entity, Error, Key, Result, Value};

/// Add `delta` to field `name` of the entity at `key`, returning the value
/// before the addition
///
/// The entity is created when missing and the field starts at `start` when
/// absent, so consecutive calls return `start`, `start + delta`, ...
pub fn increment(
    txn: &mut TransactionContext,
    key: &Key,
    name: &str,
    delta: &Value,
    start: &Value,
) -> Result<Value> {
    let mut entity = txn
        .get_entity(key)?
        .unwrap_or_else(|| Entity::new(key.clone()));

    let old = match entity.get(name) {
        Some(current) => current.clone(),
        None => start.clone(),
    };
    let new = add_checked(name, &old, delta)?;

    entity.set(name, new);
    txn.put_entity(&entity)?;
    Ok(old)
}

/// `current + delta` with the field name in any error
pub(crate) fn add_checked(field: &str, current: &Value, delta: &Value) -> Result<Value> {
    combine(field, current, delta, Value::checked_add)
}

/// `current - delta` with the field name in any error
pub(crate) fn sub_checked(field: &str, current: &Value, delta: &Value) -> Result<Value> {
    combine(field, current, delta, Value::checked_sub)
}

fn combine(
    field: &str,
    current: &Value,
    delta: &Value,
    op: fn(&Value, &Value) -> Option<Value>,
) -> Result<Value> {
    if !current.is_numeric() {
        return Err(Error::wrong_type(field, "numeric", current.type_name()));
    }
    if !delta.is_numeric() {
        return Err(Error::invalid_argument(format!(
            "operand for '{}' must be numeric, got {}",
            field,
            delta.type_name()
        )));
    }
    op(current, delta).ok_or_else(|| Error::invalid_argument(format!("integer overflow on '{}'", field)))
}

/// Reject non-numeric `delta`/`start` before any transaction runs
pub(crate) fn check_numeric(what: &str, value: &Value) -> Result<()> {
    if value.is_numeric() {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "{} must be numeric, got {}",
            what,
            value.type_name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_sequence_from_start() {
        let db = Database::ephemeral().unwrap();
        let key = Key::name("Seq", "invoice");

        let got: Vec<Value> = (0..3)
            .map(|_| {
                db.transaction(|txn| increment(txn, &key, "n", &Value::Int(1), &Value::Int(100)))
                    .unwrap()
            })
            .collect();

        assert_eq!(got, vec![Value::Int(100), Value::Int(101), Value::Int(102)]);
        let stored = db.get_entity(&key).unwrap().unwrap();
        assert_eq!(stored.get("n"), Some(&Value::Int(103)));
    }

    #[test]
    fn test_float_delta_promotes() {
        let db = Database::ephemeral().unwrap();
        let key = Key::name("Seq", "f");
        db.transaction(|txn| increment(txn, &key, "x", &Value::Float(0.5), &Value::Int(1)))
            .unwrap();
        let stored = db.get_entity(&key).unwrap().unwrap();
        assert_eq!(stored.get("x"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_non_numeric_field_is_wrong_type() {
        let db = Database::ephemeral().unwrap();
        let key = Key::name("Seq", "s");
        db.transaction(|txn| {
            txn.put_entity(&Entity::with_fields(key.clone(), [("n", "text")]))
        })
        .unwrap();

        let err = db
            .transaction(|txn| increment(txn, &key, "n", &Value::Int(1), &Value::Int(0)))
            .unwrap_err();
        assert!(matches!(err, Error::WrongType { ref field, .. } if field == "n"));
    }

    #[test]
    fn test_overflow_is_invalid_argument() {
        let err = add_checked("n", &Value::Int(i64::MAX), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(
            sub_checked("n", &Value::Int(10), &Value::Int(3)).unwrap(),
            Value::Int(7)
        );
    }
}
