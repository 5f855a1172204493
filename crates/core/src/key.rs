//! Key normalization for entkit
//!
//! Every public operation accepts keys in several shapes and resolves them to
//! one canonical [`Key`] before touching storage:
//!
//! - a structured [`Key`], returned unchanged
//! - a legacy URL-safe token string, decoded
//! - a dynamic [`Value`]: a `String` is treated as a token, anything else is
//!   rejected with [`KeyError::InvalidType`]
//!
//! ## Token format
//!
//! A legacy token is the unpadded URL-safe base64 encoding of a MessagePack
//! record `{ v: 1, path: [(kind, id), ...] }`, root first. Trailing `=`
//! padding is tolerated on decode so tokens produced by padded encoders still
//! resolve.
//!
//! Normalization is pure and idempotent:
//! `normalize_key(normalize_key(k)?) == normalize_key(k)`.

use crate::types::{Key, KeyId};
use crate::value::Value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current token format version
pub const TOKEN_FORMAT_VERSION: u8 = 1;

/// Any key representation accepted at the public surface
#[derive(Debug, Clone, PartialEq)]
pub enum AnyKey {
    /// Already-canonical structured key
    Structured(Key),
    /// Legacy URL-safe token
    Token(String),
    /// Dynamically-typed value (only `Value::String` is a valid key)
    Value(Value),
}

impl From<Key> for AnyKey {
    fn from(key: Key) -> Self {
        AnyKey::Structured(key)
    }
}

impl From<&Key> for AnyKey {
    fn from(key: &Key) -> Self {
        AnyKey::Structured(key.clone())
    }
}

impl From<String> for AnyKey {
    fn from(token: String) -> Self {
        AnyKey::Token(token)
    }
}

impl From<&str> for AnyKey {
    fn from(token: &str) -> Self {
        AnyKey::Token(token.to_string())
    }
}

impl From<Value> for AnyKey {
    fn from(value: Value) -> Self {
        AnyKey::Value(value)
    }
}

/// Key normalization errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The input is neither a structured key nor a token string
    #[error("Invalid key type: expected Key or token string, got {actual}")]
    InvalidType {
        /// Type name of the rejected input
        actual: String,
    },

    /// The token could not be decoded into a valid key
    #[error("Malformed key token: {0}")]
    Decode(String),

    /// The key could not be encoded as a token
    #[error("Key encoding failed: {0}")]
    Encode(String),

    /// A structured key has an empty kind, an empty name or an id below 1
    #[error("Invalid key: {0}")]
    InvalidElement(String),
}

impl KeyError {
    /// Short machine-readable reason
    pub fn reason_code(&self) -> &'static str {
        match self {
            KeyError::InvalidType { .. } => "invalid_key_type",
            KeyError::Decode(_) => "key_decode",
            KeyError::Encode(_) => "key_encode",
            KeyError::InvalidElement(_) => "invalid_key",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TokenRecord {
    v: u8,
    path: Vec<(String, KeyId)>,
}

/// Resolve any accepted key representation to a canonical [`Key`]
///
/// Structured keys are checked like decoded tokens, so every accepted key
/// encodes to a token that resolves back to it.
///
/// # Examples
///
/// ```
/// use entkit_core::key::normalize_key;
/// use entkit_core::types::Key;
/// use entkit_core::value::Value;
///
/// let key = Key::name("User", "alice");
/// let token = key.to_legacy_urlsafe().unwrap();
///
/// assert_eq!(normalize_key(&key).unwrap(), key);
/// assert_eq!(normalize_key(token.as_str()).unwrap(), key);
/// assert!(normalize_key(Value::Int(3)).is_err());
/// ```
pub fn normalize_key(key: impl Into<AnyKey>) -> Result<Key, KeyError> {
    match key.into() {
        AnyKey::Structured(key) => {
            key.validate()?;
            Ok(key)
        }
        AnyKey::Token(token) => Key::from_legacy_urlsafe(&token),
        AnyKey::Value(Value::String(token)) => Key::from_legacy_urlsafe(&token),
        AnyKey::Value(other) => Err(KeyError::InvalidType {
            actual: other.type_name().to_string(),
        }),
    }
}

impl Key {
    /// Reject empty kinds, empty names and ids below 1 anywhere in the path
    pub fn validate(&self) -> Result<(), KeyError> {
        for (kind, id) in self.path() {
            validate_element(kind, id).map_err(KeyError::InvalidElement)?;
        }
        Ok(())
    }

    /// Encode this key as a legacy URL-safe token
    ///
    /// Fails with [`KeyError::InvalidElement`] for keys `validate` rejects.
    pub fn to_legacy_urlsafe(&self) -> Result<String, KeyError> {
        self.validate()?;
        let record = TokenRecord {
            v: TOKEN_FORMAT_VERSION,
            path: self
                .path()
                .into_iter()
                .map(|(kind, id)| (kind.to_string(), id.clone()))
                .collect(),
        };
        let bytes = rmp_serde::to_vec(&record).map_err(|e| KeyError::Encode(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decode a legacy URL-safe token
    pub fn from_legacy_urlsafe(token: &str) -> Result<Key, KeyError> {
        let trimmed = token.trim_end_matches('=');
        if trimmed.is_empty() {
            return Err(KeyError::Decode("empty token".to_string()));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        let record: TokenRecord =
            rmp_serde::from_slice(&bytes).map_err(|e| KeyError::Decode(e.to_string()))?;

        if record.v != TOKEN_FORMAT_VERSION {
            return Err(KeyError::Decode(format!(
                "unsupported token version {}",
                record.v
            )));
        }
        for (kind, id) in &record.path {
            validate_element(kind, id).map_err(KeyError::Decode)?;
        }

        Key::from_path(record.path).ok_or_else(|| KeyError::Decode("empty key path".to_string()))
    }
}

fn validate_element(kind: &str, id: &KeyId) -> Result<(), String> {
    if kind.is_empty() {
        return Err("empty kind in key path".to_string());
    }
    match id {
        KeyId::Name(name) if name.is_empty() => Err(format!("empty name for kind {}", kind)),
        KeyId::Id(n) if *n <= 0 => Err(format!("non-positive id {} for kind {}", n, kind)),
        _ => Ok(()),
    }
}
