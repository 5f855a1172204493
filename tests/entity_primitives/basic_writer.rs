use entkit::{Error, Key, Value};

use crate::common::entities;

#[test]
fn test_missing_without_create_is_not_found() {
    let entities = entities();
    let key = Key::id("Doc", 1);

    let err = entities
        .write_in_transaction(key.clone(), false, [("a", 1)])
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { key: ref k } if k == &key));
    assert!(entities.get(key).unwrap().is_none());
}

#[test]
fn test_missing_with_create_stores_fields() {
    let entities = entities();
    let key = Key::id("Doc", 1);

    let written = entities
        .write_in_transaction(key.clone(), true, [("a", 1)])
        .unwrap();
    assert_eq!(written.get("a"), Some(&Value::Int(1)));
    assert_eq!(entities.get(key).unwrap(), Some(written));
}

#[test]
fn test_unlisted_fields_untouched_and_last_duplicate_wins() {
    let entities = entities();
    let key = Key::name("Doc", "readme");
    entities
        .write_in_transaction(key.clone(), true, [("title", "Readme"), ("rev", "1")])
        .unwrap();

    let written = entities
        .write_in_transaction(key.clone(), false, [("rev", "2"), ("rev", "3")])
        .unwrap();
    assert_eq!(written.get("title"), Some(&Value::from("Readme")));
    assert_eq!(written.get("rev"), Some(&Value::from("3")));
}
