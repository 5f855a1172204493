//! Database engine for entkit
//!
//! This crate orchestrates the lower layers:
//! - Database: open/shutdown, transaction runner with conflict retry
//! - Transaction coordination and metrics
//! - Configuration (TOML) and the database builder
//! - Background scheduler for post-commit jobs (relation refresh)
//! - Diagnostic sink injected into the database
//! - Entity primitives: basic writer, counter, status mutator
//!
//! The engine is the only component that knows about:
//! - Retry policy and backoff
//! - Cross-layer coordination (storage + OCC manager)
//! - Work scheduled outside the atomic boundary

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod coordinator;
pub mod database;
pub mod diagnostics;
pub mod primitives;

pub use background::{BackgroundScheduler, SchedulerStats, SubmitError};
pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use database::{
    BackgroundConfig, Database, DatabaseBuilder, EngineConfig, RetryConfig, CONFIG_FILE_NAME,
};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use primitives::{
    Create, Entities, EntityStoreExt, FieldDef, FieldOp, FieldType, FieldUpdate, Mutation,
    Precondition, RecordMut, RelationRefresh, SaveOutcome, Schema, SchemaRecord, StatusUpdate,
    ValidatedRecord,
};
