use entkit::{Create, Error, FieldUpdate, Key, Mutation, Precondition, StatusUpdate, Value};
use std::collections::HashMap;

use crate::common::entities;

fn values<const N: usize>(pairs: [(&str, Value); N]) -> Mutation {
    Mutation::fields(pairs).unwrap()
}

#[test]
fn test_precondition_mismatch_leaves_record_unchanged() {
    let entities = entities();
    let key = Key::id("Ticket", 1);
    let before = entities
        .write_in_transaction(
            key.clone(),
            true,
            [("status", Value::from("closed")), ("owner", Value::from("kim"))],
        )
        .unwrap();
    let version = entities.database().current_version();

    let update = StatusUpdate::new(values([("status", Value::from("in_progress"))]))
        .precondition(Precondition::fields([("status", "open")]));
    let err = entities.set_status(key.clone(), &update).unwrap_err();

    match err {
        Error::PreconditionFailed {
            field,
            expected,
            actual,
        } => {
            assert_eq!(field, "status");
            assert_eq!(expected, Value::from("open"));
            assert_eq!(actual, Some(Value::from("closed")));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(entities.get(key).unwrap(), Some(before));
    assert_eq!(entities.database().current_version(), version);
}

#[test]
fn test_precondition_match_applies_values() {
    let entities = entities();
    let key = Key::id("Ticket", 1);
    entities
        .write_in_transaction(key.clone(), true, [("status", "open")])
        .unwrap();

    let update = StatusUpdate::new(values([("status", Value::from("in_progress"))]))
        .precondition(Precondition::fields([("status", "open")]));
    let entity = entities.set_status(key, &update).unwrap();
    assert_eq!(entity.get("status"), Some(&Value::from("in_progress")));
}

#[test]
fn test_missing_without_create_creates_nothing() {
    let entities = entities();
    let key = Key::id("Ticket", 404);

    let update = StatusUpdate::new(values([("x", Value::Int(1))]));
    let err = entities.set_status(key.clone(), &update).unwrap_err();
    assert!(err.is_not_found());
    assert!(entities.get(key).unwrap().is_none());
}

#[test]
fn test_increment_then_decrement() {
    let entities = entities();
    let key = Key::id("Stock", 1);
    entities
        .write_in_transaction(key.clone(), true, [("count", 10)])
        .unwrap();

    let plus = StatusUpdate::new(values([("+count", Value::Int(5))]));
    let entity = entities.set_status(key.clone(), &plus).unwrap();
    assert_eq!(entity.get("count"), Some(&Value::Int(15)));

    let minus = StatusUpdate::new(Mutation::updates(vec![FieldUpdate::decrement("count", 3)]));
    let entity = entities.set_status(key.clone(), &minus).unwrap();
    assert_eq!(entity.get("count"), Some(&Value::Int(12)));
}

#[test]
fn test_arithmetic_on_non_numeric_is_wrong_type() {
    let entities = entities();
    let key = Key::id("Stock", 1);
    entities
        .write_in_transaction(key.clone(), true, [("count", "lots")])
        .unwrap();

    let update = StatusUpdate::new(values([("-count", Value::Int(1))]));
    let err = entities.set_status(key, &update).unwrap_err();
    assert!(matches!(err, Error::WrongType { .. }));
}

#[test]
fn test_create_procedure_runs_before_precondition() {
    let entities = entities();
    let key = Key::name("Job", "nightly");

    let update = StatusUpdate::new(values([("status", Value::from("running")), ("+runs", Value::Int(1))]))
        .create(Create::procedure(|record| {
            record.set("status", "idle")?;
            record.set("runs", 0)
        }))
        .precondition(Precondition::fields([("status", "idle")]));

    let entity = entities.set_status(key.clone(), &update).unwrap();
    assert_eq!(entity.get("status"), Some(&Value::from("running")));
    assert_eq!(entity.get("runs"), Some(&Value::Int(1)));

    // exists now: creation skipped, precondition fails on "running"
    let err = entities.set_status(key, &update).unwrap_err();
    assert!(err.is_precondition());
}

#[test]
fn test_mutation_procedure() {
    let entities = entities();
    let key = Key::name("Flag", "beta");
    entities
        .write_in_transaction(key.clone(), true, [("enabled", false)])
        .unwrap();

    let update = StatusUpdate::new(Mutation::procedure(|record| {
        let enabled = record.get("enabled").and_then(Value::as_bool).unwrap_or(false);
        record.set("enabled", !enabled)
    }));
    let entity = entities.set_status(key, &update).unwrap();
    assert_eq!(entity.get("enabled"), Some(&Value::Bool(true)));
}

#[test]
fn test_procedure_precondition_error_propagates() {
    let entities = entities();
    let key = Key::name("Flag", "beta");
    entities
        .write_in_transaction(key.clone(), true, [("locked", true)])
        .unwrap();

    let update = StatusUpdate::new(values([("enabled", Value::Bool(true))])).precondition(
        Precondition::procedure(|record| match record.field("locked") {
            Some(Value::Bool(true)) => Err(Error::precondition_rejected("flag is locked")),
            _ => Ok(()),
        }),
    );
    let err = entities.set_status(key.clone(), &update).unwrap_err();
    assert!(matches!(err, Error::PreconditionRejected { .. }));
    assert!(!entities.get(key).unwrap().unwrap().contains("enabled"));
}

#[test]
fn test_dynamic_parameters() {
    let entities = entities();
    let key = Key::id("Stock", 9);

    let values_obj: HashMap<String, Value> =
        [("+count".to_string(), Value::Int(2))].into_iter().collect();
    let create_obj: HashMap<String, Value> =
        [("count".to_string(), Value::Int(5))].into_iter().collect();

    let update = StatusUpdate::from_value(Value::Object(values_obj))
        .unwrap()
        .create(Create::from_value(Value::Object(create_obj)).unwrap());
    let entity = entities.set_status(key, &update).unwrap();
    assert_eq!(entity.get("count"), Some(&Value::Int(7)));

    let err = StatusUpdate::from_value(Value::from("status=done")).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
