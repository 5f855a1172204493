use entkit::{Database, EngineConfig, Entities, Error, Key, RetryConfig, Value, CONFIG_FILE_NAME};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[test]
fn test_config_file_sets_retry_budget() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);

    EngineConfig::write_default_if_missing(&path).unwrap();
    let mut config = EngineConfig::from_file(&path).unwrap();
    assert_eq!(config.retry.max_retries, 10);

    config.retry = RetryConfig::new()
        .with_max_retries(0)
        .with_base_delay_ms(0)
        .with_max_delay_ms(0);
    config.write_to_file(&path).unwrap();

    let db = Database::builder().config_file(&path).unwrap().open().unwrap();
    let entities = Entities::new(db.clone());
    let key = Key::id("Ticket", 1);
    entities
        .write_in_transaction(key.clone(), true, [("status", "open")])
        .unwrap();

    // every attempt is invalidated before it commits; no retry is allowed
    let attempts = AtomicUsize::new(0);
    let err = db
        .run_in_transaction(|txn| {
            attempts.fetch_add(1, Ordering::SeqCst);
            txn.get(&key)?;
            db.transaction(|other| other.put(key.clone(), Value::Int(1)))?;
            txn.put(key.clone(), Value::Int(2))
        })
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_malformed_config_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[retry\nmax_retries = ").unwrap();

    let err = Database::builder().config_file(&path).unwrap_err();
    match err {
        Error::InvalidArgument(msg) => assert!(msg.contains(CONFIG_FILE_NAME), "{}", msg),
        other => panic!("unexpected error {:?}", other),
    }
}
