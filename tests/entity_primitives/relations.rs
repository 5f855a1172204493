use entkit::{
    Create, Diagnostic, FieldDef, FieldType, Key, Mutation, Schema, SchemaRecord, StatusUpdate,
    Value,
};
use std::sync::Arc;

use crate::common::entities_with_sink;

fn member_template() -> SchemaRecord {
    SchemaRecord::new(Arc::new(
        Schema::new("Member")
            .field(FieldDef::new("name", FieldType::String).required())
            .field(FieldDef::relation("team", "Team", ["title"])),
    ))
}

fn team_template() -> SchemaRecord {
    SchemaRecord::new(Arc::new(
        Schema::new("Team").field(FieldDef::new("title", FieldType::String)),
    ))
}

fn dest_title(entity: &entkit::Entity) -> Option<Value> {
    entity
        .get("team")?
        .as_object()?
        .get("dest")?
        .as_object()?
        .get("title")
        .cloned()
}

#[test]
fn test_refresh_propagates_target_change() {
    let (entities, sink) = entities_with_sink();
    let db = Arc::clone(entities.database());
    let team = Key::name("Team", "core");
    let member = Key::id("Member", 1);

    entities
        .write_in_transaction(team.clone(), true, [("title", "Core")])
        .unwrap();
    let join = StatusUpdate::new(
        Mutation::fields([
            ("name", Value::from("ada")),
            ("team", Value::String(team.to_legacy_urlsafe().unwrap())),
        ])
        .unwrap(),
    )
    .create(Create::Empty);
    entities
        .set_status_record(member.clone(), &member_template(), &join)
        .unwrap();

    let rename = StatusUpdate::new(Mutation::fields([("title", "Core Platform")]).unwrap())
        .update_relations(true);
    entities
        .set_status_record(team.clone(), &team_template(), &rename)
        .unwrap();
    db.scheduler().drain();

    let stored = entities.get(member).unwrap().unwrap();
    assert_eq!(dest_title(&stored), Some(Value::from("Core Platform")));
    assert_eq!(
        sink.take(),
        vec![
            Diagnostic::RelationRefreshScheduled { key: team.clone() },
            Diagnostic::RelationRefreshCompleted {
                key: team,
                updated: 1
            },
        ]
    );
}

#[test]
fn test_no_refresh_without_flag() {
    let (entities, sink) = entities_with_sink();
    let team = Key::name("Team", "core");

    let update = StatusUpdate::new(Mutation::fields([("title", "Core")]).unwrap())
        .create(Create::Empty);
    entities
        .set_status_record(team, &team_template(), &update)
        .unwrap();
    entities.database().scheduler().drain();

    assert!(sink.events().is_empty());
}

#[test]
fn test_raw_status_ignores_refresh_flag() {
    let (entities, sink) = entities_with_sink();
    let team = Key::name("Team", "core");

    let update = StatusUpdate::new(Mutation::fields([("title", "Core")]).unwrap())
        .create(Create::Empty)
        .update_relations(true);
    entities.set_status(team.clone(), &update).unwrap();
    entities.database().scheduler().drain();

    assert!(sink.events().is_empty());
    assert_eq!(entities.database().scheduler().stats().jobs_completed, 0);
    assert_eq!(
        entities.get(team).unwrap().unwrap().get("title"),
        Some(&Value::from("Core"))
    );
}

#[test]
fn test_refresh_failure_is_reported_not_raised() {
    let (entities, sink) = entities_with_sink();
    let db = Arc::clone(entities.database());
    let team = Key::name("Team", "core");

    // a corrupt index entry under the team makes the refresh fail
    db.transaction(|txn| {
        txn.put(
            Key::name(entkit::primitives::RELATION_INDEX_KIND, "bogus").with_parent(team.clone()),
            Value::Object(Default::default()),
        )
    })
    .unwrap();

    let update = StatusUpdate::new(Mutation::fields([("title", "Core")]).unwrap())
        .create(Create::Empty)
        .update_relations(true);
    assert!(entities
        .set_status_record(team.clone(), &team_template(), &update)
        .is_ok());
    db.scheduler().drain();

    let events = sink.take();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        Diagnostic::RelationRefreshFailed { key, .. } if key == &team
    ));
}
