//! Shared helpers for the entity primitive tests

#![allow(dead_code)]

use entkit::{Database, Entities, MemorySink, RetryConfig};
use std::sync::Arc;

/// Facade over a fresh in-memory database
pub fn entities() -> Entities {
    Entities::new(Database::ephemeral().unwrap())
}

/// Facade plus the sink receiving its diagnostics
pub fn entities_with_sink() -> (Entities, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let db = Database::builder().diagnostics(sink.clone()).open().unwrap();
    (Entities::new(db), sink)
}

/// Facade that retries conflicts practically forever without sleeping long
pub fn contended_entities() -> Entities {
    let db = Database::builder()
        .retry(
            RetryConfig::new()
                .with_max_retries(10_000)
                .with_base_delay_ms(0)
                .with_max_delay_ms(1),
        )
        .open()
        .unwrap();
    Entities::new(db)
}
