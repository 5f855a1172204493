//! Relation index and asynchronous relation refresh
//!
//! Every saved relation `referrer.field -> target` has an index entry of
//! kind [`RELATION_INDEX_KIND`] whose parent is the target key, written in
//! the same transaction as the referrer. [`RelationRefresh`] walks the
//! entries under a target and re-copies the target's fields into each
//! referrer's `dest`.
//!
//! Refresh is best-effort: it runs on the background scheduler after the
//! triggering commit, is never retried beyond the normal conflict retry,
//! and reports its outcome to the database's diagnostic sink.

use super::extensions::EntityStoreExt;
use crate::diagnostics::Diagnostic;
use crate::Database;
use entkit_concurrency::TransactionContext;
use entkit_core::{normalize_key, Entity, Error, Key, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Kind of relation index entries
pub const RELATION_INDEX_KIND: &str = "_relation";

const KEY_FIELD: &str = "key";
const DEST_FIELD: &str = "dest";

/// Stored form of a relation: `{key: <token>, dest: {...}}`
pub fn relation_value(target: &Key, dest: HashMap<String, Value>) -> Result<Value> {
    let mut stored = HashMap::with_capacity(2);
    stored.insert(KEY_FIELD.to_string(), Value::String(target.to_legacy_urlsafe()?));
    stored.insert(DEST_FIELD.to_string(), Value::Object(dest));
    Ok(Value::Object(stored))
}

/// Target of a stored relation value, `None` for null
pub fn relation_target(value: &Value) -> Result<Option<Key>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => match map.get(KEY_FIELD) {
            Some(Value::String(token)) => Ok(Some(Key::from_legacy_urlsafe(token)?)),
            _ => Err(Error::invalid_argument("relation value has no key token")),
        },
        other => Err(Error::wrong_type("relation", "Object", other.type_name())),
    }
}

/// Key named by a relation assignment: a token, or a stored relation value
pub(crate) fn target_from_input(value: Value) -> Result<Key> {
    if value.is_object() {
        return relation_target(&value)?
            .ok_or_else(|| Error::invalid_argument("relation value has no key token"));
    }
    Ok(normalize_key(value)?)
}

/// The `copy` fields of `entity` that it actually has
pub fn copy_fields(entity: &Entity, copy: &[String]) -> HashMap<String, Value> {
    copy.iter()
        .filter_map(|name| entity.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

/// One indexed relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEntry {
    /// Entity holding the relation field
    pub referrer: Key,
    /// Relation field on the referrer
    pub field: String,
    /// Fields copied from the target
    pub copy: Vec<String>,
}

fn index_key(target: &Key, referrer: &Key, field: &str) -> Result<Key> {
    let name = format!("{}#{}", referrer.to_legacy_urlsafe()?, field);
    Ok(Key::name(RELATION_INDEX_KIND, name).with_parent(target.clone()))
}

pub(crate) fn add_index(
    txn: &mut TransactionContext,
    target: &Key,
    referrer: &Key,
    field: &str,
    copy: &[String],
) -> Result<()> {
    let entry = Entity::with_fields(
        index_key(target, referrer, field)?,
        [
            ("referrer", Value::String(referrer.to_legacy_urlsafe()?)),
            ("field", Value::from(field)),
            (
                "copy",
                Value::Array(copy.iter().map(|c| Value::from(c.as_str())).collect()),
            ),
        ],
    );
    txn.put_entity(&entry)
}

pub(crate) fn remove_index(
    txn: &mut TransactionContext,
    target: &Key,
    referrer: &Key,
    field: &str,
) -> Result<()> {
    txn.delete_entity(&index_key(target, referrer, field)?)
}

fn decode_entry(entity: &Entity) -> Result<RelationEntry> {
    let corrupt = || Error::Serialization(format!("corrupt relation index entry {}", entity.key()));
    let referrer = entity.get("referrer").and_then(Value::as_str).ok_or_else(corrupt)?;
    let field = entity.get("field").and_then(Value::as_str).ok_or_else(corrupt)?;
    let copy = entity
        .get("copy")
        .and_then(Value::as_array)
        .ok_or_else(corrupt)?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(corrupt))
        .collect::<Result<Vec<_>>>()?;
    Ok(RelationEntry {
        referrer: Key::from_legacy_urlsafe(referrer)?,
        field: field.to_string(),
        copy,
    })
}

/// Relations pointing at `target`, as seen by `txn`
pub fn referrers(txn: &mut TransactionContext, target: &Key) -> Result<Vec<RelationEntry>> {
    txn.scan_entities_under(RELATION_INDEX_KIND, target)?
        .iter()
        .filter(|entry| entry.key().parent() == Some(target))
        .map(decode_entry)
        .collect()
}

/// Re-copy a target's fields into everything that references it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRefresh {
    target: Key,
}

impl RelationRefresh {
    /// Refresh of the referrers of `target`
    pub fn new(target: Key) -> Self {
        Self { target }
    }

    /// Entity whose referrers are refreshed
    pub fn target(&self) -> &Key {
        &self.target
    }

    /// Run inside `txn`, returning how many referrers were rewritten
    ///
    /// Entries whose referrer is gone or no longer points at the target
    /// are dropped. A deleted target leaves referrers with an empty `dest`.
    pub fn run_in(&self, txn: &mut TransactionContext) -> Result<usize> {
        let target = txn.get_entity(&self.target)?;
        let mut updated = 0;

        for entry in referrers(txn, &self.target)? {
            let mut referrer = match txn.get_entity(&entry.referrer)? {
                Some(referrer) => referrer,
                None => {
                    remove_index(txn, &self.target, &entry.referrer, &entry.field)?;
                    continue;
                }
            };

            let current = referrer.get(&entry.field).cloned().unwrap_or(Value::Null);
            if relation_target(&current).ok().flatten().as_ref() != Some(&self.target) {
                remove_index(txn, &self.target, &entry.referrer, &entry.field)?;
                continue;
            }

            let dest = target
                .as_ref()
                .map(|t| copy_fields(t, &entry.copy))
                .unwrap_or_default();
            let refreshed = relation_value(&self.target, dest)?;
            if refreshed != current {
                referrer.set(entry.field.clone(), refreshed);
                txn.put_entity(&referrer)?;
                updated += 1;
            }
        }

        Ok(updated)
    }

    /// Run in its own transaction on `db`
    pub fn run(&self, db: &Database) -> Result<usize> {
        db.run_background(|txn| self.run_in(txn))
    }
}

/// Queue a refresh of `target`'s referrers on `db`'s scheduler
///
/// Never fails the caller: a rejected submission and a failed run are
/// both reported as [`Diagnostic::RelationRefreshFailed`].
pub fn schedule_refresh(db: &Arc<Database>, target: Key) {
    db.diagnostics().report(Diagnostic::RelationRefreshScheduled {
        key: target.clone(),
    });

    let job_db = Arc::clone(db);
    let job = RelationRefresh::new(target.clone());
    let submitted = db.scheduler().submit(move || {
        let event = match job.run(&job_db) {
            Ok(updated) => Diagnostic::RelationRefreshCompleted {
                key: job.target.clone(),
                updated,
            },
            Err(e) => Diagnostic::RelationRefreshFailed {
                key: job.target.clone(),
                reason: e.to_string(),
            },
        };
        job_db.diagnostics().report(event);
    });

    if let Err(e) = submitted {
        db.diagnostics().report(Diagnostic::RelationRefreshFailed {
            key: target,
            reason: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(db: &Database, entities: Vec<Entity>) {
        db.transaction(|txn| {
            for e in &entities {
                txn.put_entity(e)?;
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_relation_value_round_trip() {
        let target = Key::name("Team", "core");
        let value = relation_value(&target, HashMap::new()).unwrap();
        assert_eq!(relation_target(&value).unwrap(), Some(target));
        assert_eq!(relation_target(&Value::Null).unwrap(), None);
        assert!(relation_target(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_target_from_token_or_stored_value() {
        let target = Key::name("Team", "core");
        let token = Value::String(target.to_legacy_urlsafe().unwrap());
        assert_eq!(target_from_input(token).unwrap(), target);

        let stored = relation_value(&target, HashMap::new()).unwrap();
        assert_eq!(target_from_input(stored).unwrap(), target);

        assert!(matches!(
            target_from_input(Value::Int(3)),
            Err(Error::InvalidKeyType { .. })
        ));
    }

    #[test]
    fn test_refresh_rewrites_stale_dest() {
        let db = Database::ephemeral().unwrap();
        let team = Key::name("Team", "core");
        let member = Key::id("Member", 1);

        let stale = relation_value(
            &team,
            HashMap::from([("title".to_string(), Value::from("old"))]),
        )
        .unwrap();
        seed(
            &db,
            vec![
                Entity::with_fields(team.clone(), [("title", "new")]),
                Entity::with_fields(member.clone(), [("team", stale)]),
            ],
        );
        db.transaction(|txn| add_index(txn, &team, &member, "team", &["title".to_string()]))
            .unwrap();

        let updated = RelationRefresh::new(team.clone()).run(&db).unwrap();
        assert_eq!(updated, 1);

        let stored = db.get_entity(&member).unwrap().unwrap();
        let dest = stored
            .get("team")
            .and_then(Value::as_object)
            .and_then(|m| m.get("dest"))
            .and_then(Value::as_object)
            .unwrap();
        assert_eq!(dest.get("title"), Some(&Value::from("new")));

        // nothing left to change
        assert_eq!(RelationRefresh::new(team).run(&db).unwrap(), 0);
    }

    #[test]
    fn test_refresh_drops_dangling_entries() {
        let db = Database::ephemeral().unwrap();
        let team = Key::name("Team", "core");
        seed(&db, vec![Entity::with_fields(team.clone(), [("title", "t")])]);
        db.transaction(|txn| add_index(txn, &team, &Key::id("Member", 9), "team", &[]))
            .unwrap();

        assert_eq!(RelationRefresh::new(team.clone()).run(&db).unwrap(), 0);
        let left = db.transaction(|txn| referrers(txn, &team)).unwrap();
        assert!(left.is_empty());
    }

    #[test]
    fn test_referrers_read_only_target_entries() {
        let db = Database::ephemeral().unwrap();
        let a = Key::name("Team", "a");
        let b = Key::name("Team", "b");
        db.transaction(|txn| {
            for i in 1..=50 {
                add_index(txn, &b, &Key::id("Member", i), "team", &[])?;
            }
            add_index(txn, &a, &Key::id("Member", 99), "team", &[])
        })
        .unwrap();

        let mut txn = db.begin_transaction();
        let entries = referrers(&mut txn, &a).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].referrer, Key::id("Member", 99));
        assert_eq!(txn.read_count(), 1);
        db.abort_transaction(&mut txn, "read only");
    }
}
