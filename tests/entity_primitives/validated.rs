use entkit::{
    Create, Error, FieldDef, FieldType, Key, Mutation, Precondition, Schema, SchemaRecord,
    StatusUpdate, Value,
};
use std::sync::Arc;

use crate::common::entities;

fn order_template() -> SchemaRecord {
    SchemaRecord::new(Arc::new(
        Schema::new("Order")
            .field(FieldDef::new("status", FieldType::String).required())
            .field(FieldDef::new("items", FieldType::Int).default_value(0))
            .field(FieldDef::relation("customer", "Customer", ["name"])),
    ))
}

#[test]
fn test_create_with_relation_and_defaults() {
    let entities = entities();
    let customer = Key::name("Customer", "ada");
    entities
        .write_in_transaction(customer.clone(), true, [("name", "Ada"), ("tier", "gold")])
        .unwrap();

    let token = customer.to_legacy_urlsafe().unwrap();
    let update = StatusUpdate::new(Mutation::fields([("+items", Value::Int(2))]).unwrap()).create(
        Create::fields([
            ("status", Value::from("open")),
            ("customer", Value::String(token)),
        ]),
    );

    let template = order_template();
    let key = Key::id("Order", 1);
    let record = entities.set_status_record(key.clone(), &template, &update).unwrap();

    assert_eq!(record.get("items"), Some(&Value::Int(2)));
    assert_eq!(record.relation_target("customer").unwrap(), Some(customer));
    // the template itself is never bound or mutated
    assert!(template.get("status").is_none());

    let stored = entities.get(key).unwrap().unwrap();
    let dest = stored
        .get("customer")
        .and_then(Value::as_object)
        .and_then(|relation| relation.get("dest"))
        .and_then(Value::as_object)
        .unwrap();
    assert_eq!(dest.get("name"), Some(&Value::from("Ada")));
    assert!(dest.get("tier").is_none());
}

#[test]
fn test_rejected_save_is_persistence_failed() {
    let entities = entities();
    let key = Key::id("Order", 2);

    // creates the record but never sets the required status
    let update = StatusUpdate::new(Mutation::fields([("items", Value::Int(1))]).unwrap())
        .create(Create::Empty);
    let err = entities
        .set_status_record(key.clone(), &order_template(), &update)
        .unwrap_err();

    match err {
        Error::PersistenceFailed { key: failed, reason } => {
            assert_eq!(failed, key);
            assert!(reason.contains("status"), "reason: {}", reason);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(entities.get(key).unwrap().is_none());
}

#[test]
fn test_rejected_save_leaves_existing_entity_unchanged() {
    let entities = entities();
    let key = Key::id("Order", 6);
    let before = entities
        .write_in_transaction(
            key.clone(),
            true,
            [("status", Value::from("open")), ("items", Value::Int(3))],
        )
        .unwrap();

    // status is required; clearing it makes the save refuse
    let update = StatusUpdate::new(
        Mutation::fields([("status", Value::Null), ("+items", Value::Int(1))]).unwrap(),
    );
    let err = entities
        .set_status_record(key.clone(), &order_template(), &update)
        .unwrap_err();

    assert!(matches!(err, Error::PersistenceFailed { .. }));
    assert_eq!(entities.get(key).unwrap(), Some(before));
}

#[test]
fn test_procedure_sets_relation() {
    let entities = entities();
    let customer = Key::name("Customer", "ada");
    entities
        .write_in_transaction(customer.clone(), true, [("name", "Ada")])
        .unwrap();
    let key = Key::id("Order", 7);
    entities
        .write_in_transaction(key.clone(), true, [("status", "open")])
        .unwrap();

    let target = customer.clone();
    let update = StatusUpdate::new(Mutation::procedure(move |record| {
        record.set("status", "assigned")?;
        record.set("customer", target.to_legacy_urlsafe()?)
    }));
    let record = entities
        .set_status_record(key.clone(), &order_template(), &update)
        .unwrap();
    assert_eq!(record.relation_target("customer").unwrap(), Some(customer.clone()));

    let stored = entities.get(key).unwrap().unwrap();
    let dest_name = stored
        .get("customer")
        .and_then(Value::as_object)
        .and_then(|relation| relation.get("dest"))
        .and_then(Value::as_object)
        .and_then(|dest| dest.get("name"))
        .cloned();
    assert_eq!(dest_name, Some(Value::from("Ada")));

    // the index lets a refresh of the customer find this order
    let referrers = entities
        .database()
        .transaction(|txn| entkit::primitives::relations::referrers(txn, &customer))
        .unwrap();
    assert_eq!(referrers.len(), 1);
}

#[test]
fn test_typed_assignment_rejected() {
    let entities = entities();
    let key = Key::id("Order", 3);
    entities
        .write_in_transaction(key.clone(), true, [("status", "open")])
        .unwrap();

    let update = StatusUpdate::new(Mutation::fields([("items", Value::from("many"))]).unwrap());
    let err = entities
        .set_status_record(key, &order_template(), &update)
        .unwrap_err();
    assert!(matches!(err, Error::WrongType { .. }));
}

#[test]
fn test_relation_to_missing_target_fails_whole_operation() {
    let entities = entities();
    let key = Key::id("Order", 4);
    entities
        .write_in_transaction(key.clone(), true, [("status", "open")])
        .unwrap();

    let ghost = Key::name("Customer", "ghost").to_legacy_urlsafe().unwrap();
    let update = StatusUpdate::new(
        Mutation::fields([
            ("status", Value::from("paid")),
            ("customer", Value::String(ghost)),
        ])
        .unwrap(),
    );
    let err = entities
        .set_status_record(key.clone(), &order_template(), &update)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(
        entities.get(key).unwrap().unwrap().get("status"),
        Some(&Value::from("open"))
    );
}

#[test]
fn test_precondition_on_validated_record() {
    let entities = entities();
    let key = Key::id("Order", 5);
    entities
        .write_in_transaction(
            key.clone(),
            true,
            [("status", Value::from("open")), ("items", Value::Int(0))],
        )
        .unwrap();

    let update = StatusUpdate::new(Mutation::fields([("status", "shipped")]).unwrap())
        .precondition(Precondition::fields([("status", "paid")]));
    let err = entities
        .set_status_record(key, &order_template(), &update)
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed { ref field, .. } if field == "status"));
}
