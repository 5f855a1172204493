//! Entity primitive integration tests
//!
//! Exercises the public `entkit` surface end to end: key normalization,
//! the basic writer, the counter, the status mutator on both persistence
//! strategies, relation refresh, file configuration, and behaviour under
//! contention.

mod common;

mod basic_writer;
mod concurrency;
mod config;
mod counter;
mod keys;
mod logging;
mod relations;
mod status;
mod validated;
