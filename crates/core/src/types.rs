//! Core identity types for entkit
//!
//! This module defines:
//! - KeyId: numeric id or string name of one path element
//! - Key: hierarchical entity key (ancestor path + kind + id/name)
//! - Versioned: a value tagged with the commit version that produced it
//!
//! ## Key Ordering
//!
//! Keys order by their full path, root first. Two keys sharing a parent and
//! kind order by id: numeric ids sort before names. The storage layer relies
//! on this ordering for deterministic kind scans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single key path element
///
/// A datastore-style key element is addressed either by an allocated
/// numeric id or by a caller-chosen name, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Numeric id (must be positive)
    Id(i64),
    /// String name (must be non-empty)
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Id(id) => write!(f, "{}", id),
            KeyId::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// Canonical entity key
///
/// A key is a path of `(kind, id)` pairs. The last pair identifies the
/// entity itself, the preceding pairs its ancestors. Keys are immutable
/// once built; use [`Key::with_parent`] to place a key under an ancestor.
///
/// # Examples
///
/// ```
/// use entkit_core::types::Key;
///
/// let user = Key::name("User", "alice");
/// let order = Key::id("Order", 42).with_parent(user.clone());
///
/// assert_eq!(order.kind(), "Order");
/// assert_eq!(order.parent(), Some(&user));
/// assert_eq!(order.to_string(), "User:\"alice\"/Order:42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    /// Ancestor key, if any
    parent: Option<Box<Key>>,
    /// Entity kind (e.g. "User")
    kind: String,
    /// Numeric id or name within the kind
    id: KeyId,
}

impl Key {
    /// Create a key from kind and element id
    pub fn new(kind: impl Into<String>, id: KeyId) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            id,
        }
    }

    /// Create a key addressed by name
    pub fn name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, KeyId::Name(name.into()))
    }

    /// Create a key addressed by numeric id
    pub fn id(kind: impl Into<String>, id: i64) -> Self {
        Self::new(kind, KeyId::Id(id))
    }

    /// Place this key under `parent`
    ///
    /// Replaces any existing ancestor path.
    pub fn with_parent(mut self, parent: Key) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Entity kind of the last path element
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Id or name of the last path element
    pub fn key_id(&self) -> &KeyId {
        &self.id
    }

    /// Name of the last path element, if it is named
    pub fn name_str(&self) -> Option<&str> {
        match &self.id {
            KeyId::Name(name) => Some(name),
            KeyId::Id(_) => None,
        }
    }

    /// Numeric id of the last path element, if it has one
    pub fn id_num(&self) -> Option<i64> {
        match self.id {
            KeyId::Id(id) => Some(id),
            KeyId::Name(_) => None,
        }
    }

    /// Direct ancestor
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Full path, root first
    pub fn path(&self) -> Vec<(&str, &KeyId)> {
        let mut path = match &self.parent {
            Some(parent) => parent.path(),
            None => Vec::new(),
        };
        path.push((self.kind.as_str(), &self.id));
        path
    }

    /// Rebuild a key from a root-first path
    ///
    /// Returns `None` for an empty path.
    pub fn from_path(path: impl IntoIterator<Item = (String, KeyId)>) -> Option<Self> {
        let mut key: Option<Key> = None;
        for (kind, id) in path {
            let element = Key::new(kind, id);
            key = Some(match key {
                Some(parent) => element.with_parent(parent),
                None => element,
            });
        }
        key
    }

    /// Check whether `ancestor` appears anywhere in this key's parent chain
    pub fn is_descendant_of(&self, ancestor: &Key) -> bool {
        let mut current = self.parent();
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A value tagged with the commit version that wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// The stored value
    pub value: T,
    /// Commit version (monotonic, assigned by the transaction manager)
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Wrap a value with its version
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }

    /// Map the inner value, keeping the version
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }
}

/// Versioned dynamic value as returned by storage
pub type VersionedValue = Versioned<crate::value::Value>;
