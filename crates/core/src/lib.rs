//! Core types and traits for entkit
//!
//! This crate defines the foundational types used throughout the system:
//! - Key / KeyId: hierarchical entity keys
//! - AnyKey + normalize_key: key normalization from tokens and dynamic values
//! - Value: dynamic field value
//! - Entity: keyed field mapping
//! - Error: error type hierarchy
//! - Traits: Storage, SnapshotView, FieldAccess

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod key;
pub mod traits;
pub mod types;
pub mod value;

pub use entity::Entity;
pub use error::{Error, Result};
pub use key::{normalize_key, AnyKey, KeyError};
pub use traits::{FieldAccess, SnapshotView, Storage};
pub use types::{Key, KeyId, Versioned, VersionedValue};
pub use value::Value;
