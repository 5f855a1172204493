use entkit::{normalize_key, Entity, Error, Key, KeyError, Value};
use proptest::prelude::*;

use crate::common::entities;

fn arb_key() -> impl Strategy<Value = Key> {
    let part = ("[A-Z][a-z]{0,6}", prop_oneof![
        (1i64..i64::MAX).prop_map(|id| (id, None::<String>)),
        "[a-z0-9_-]{1,12}".prop_map(|name| (0, Some(name))),
    ]);
    prop::collection::vec(part, 1..4).prop_map(|parts| {
        let mut key: Option<Key> = None;
        for (kind, (id, name)) in parts {
            let next = match name {
                Some(name) => Key::name(kind, name),
                None => Key::id(kind, id),
            };
            key = Some(match key {
                Some(parent) => next.with_parent(parent),
                None => next,
            });
        }
        key.unwrap()
    })
}

proptest! {
    #[test]
    fn normalization_is_idempotent(key in arb_key()) {
        let once = normalize_key(key.clone()).unwrap();
        let twice = normalize_key(once.clone()).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(&once, &key);

        let token = key.to_legacy_urlsafe().unwrap();
        prop_assert_eq!(normalize_key(token.as_str()).unwrap(), key);
    }
}

#[test]
fn test_non_string_value_is_invalid_key_type() {
    assert!(matches!(
        normalize_key(Value::Int(7)),
        Err(KeyError::InvalidType { .. })
    ));
}

#[test]
fn test_garbage_token_fails_before_any_write() {
    let entities = entities();
    let err = entities
        .write_in_transaction("%%% not a token", true, [("a", 1)])
        .unwrap_err();
    assert!(matches!(err, Error::KeyDecode(_)));
    assert_eq!(entities.database().metrics().total_started, 0);
}

#[test]
fn test_structured_key_without_valid_id_fails_before_any_write() {
    let entities = entities();
    for key in [
        Key::id("Ticket", 0),
        Key::name("Ticket", ""),
        Key::name("Comment", "c1").with_parent(Key::id("Ticket", -5)),
    ] {
        let err = entities
            .write_in_transaction(key.clone(), true, [("a", 1)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{:?}: {:?}", key, err);
        assert!(key.to_legacy_urlsafe().is_err());
    }
    assert_eq!(entities.database().metrics().total_started, 0);
}

#[test]
fn test_token_and_key_reach_the_same_entity() {
    let entities = entities();
    let key = Key::name("Page", "about").with_parent(Key::id("Site", 3));
    let token = key.to_legacy_urlsafe().unwrap();

    entities
        .write_in_transaction(Value::String(token), true, [("title", "About")])
        .unwrap();
    let stored: Entity = entities.get(&key).unwrap().unwrap();
    assert_eq!(stored.key(), &key);
}
