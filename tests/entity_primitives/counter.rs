use entkit::{Error, Key, Value};

use crate::common::entities;

#[test]
fn test_sequence_starts_at_start() {
    let entities = entities();
    let key = Key::id("Seq", 1);

    let seen: Vec<Value> = (0..3)
        .map(|_| entities.increase_counter(key.clone(), "n", 1, 0).unwrap())
        .collect();
    assert_eq!(seen, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);

    let stored = entities.get(key).unwrap().unwrap();
    assert_eq!(stored.get("n"), Some(&Value::Int(3)));
}

#[test]
fn test_existing_field_ignores_start() {
    let entities = entities();
    let key = Key::id("Seq", 1);
    entities
        .write_in_transaction(key.clone(), true, [("n", 40)])
        .unwrap();

    assert_eq!(
        entities.increase_counter(key.clone(), "n", 2, 1000).unwrap(),
        Value::Int(40)
    );
    assert_eq!(
        entities.get(key).unwrap().unwrap().get("n"),
        Some(&Value::Int(42))
    );
}

#[test]
fn test_float_delta_widens() {
    let entities = entities();
    let key = Key::id("Seq", 1);
    entities.increase_counter(key.clone(), "x", 0.5, 1).unwrap();
    assert_eq!(
        entities.get(key).unwrap().unwrap().get("x"),
        Some(&Value::Float(1.5))
    );
}

#[test]
fn test_non_numeric_field_is_wrong_type() {
    let entities = entities();
    let key = Key::id("Seq", 1);
    entities
        .write_in_transaction(key.clone(), true, [("n", "ten")])
        .unwrap();

    let err = entities.increment(key.clone(), "n").unwrap_err();
    assert!(matches!(err, Error::WrongType { .. }));
    assert_eq!(
        entities.get(key).unwrap().unwrap().get("n"),
        Some(&Value::from("ten"))
    );
}

#[test]
fn test_overflow_is_invalid_argument() {
    let entities = entities();
    let key = Key::id("Seq", 1);
    entities
        .write_in_transaction(key.clone(), true, [("n", i64::MAX)])
        .unwrap();

    let err = entities.increment(key, "n").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
