//! Error types for entkit
//!
//! One error enum covers every layer. Application-level failures
//! (not found, precondition, argument, type, persistence) abort the
//! enclosing transaction and are never retried. `Conflict` is the only
//! retryable kind and reaches callers only once the retry budget is spent.

use crate::key::KeyError;
use crate::types::Key;
use crate::value::Value;
use thiserror::Error;

/// Result type alias for entkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for entkit
#[derive(Debug, Error)]
pub enum Error {
    /// Key input was neither a structured key nor a token string
    #[error("Invalid key type: {actual}")]
    InvalidKeyType {
        /// Type name of the rejected input
        actual: String,
    },

    /// Key token could not be decoded
    #[error("Key decode error: {0}")]
    KeyDecode(String),

    /// Entity does not exist and creation was not requested
    #[error("Entity not found: {key}")]
    NotFound {
        /// Normalized key that was looked up
        key: Key,
    },

    /// A precondition field did not hold its expected value
    #[error("Precondition failed on '{field}': expected {expected:?}, found {actual:?}")]
    PreconditionFailed {
        /// Field that was checked
        field: String,
        /// Expected value
        expected: Value,
        /// Value found on the record (`None` when the field is absent)
        actual: Option<Value>,
    },

    /// A precondition procedure rejected the record
    #[error("Precondition rejected: {reason}")]
    PreconditionRejected {
        /// Reason supplied by the procedure
        reason: String,
    },

    /// A parameter had an unsupported shape
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Arithmetic or typed assignment hit an incompatible value
    #[error("Wrong type for '{field}': expected {expected}, found {actual}")]
    WrongType {
        /// Field involved
        field: String,
        /// Expected type description
        expected: String,
        /// Actual type name, or "missing"
        actual: String,
    },

    /// The validated record refused to save
    #[error("Persistence failed for {key}: {reason}")]
    PersistenceFailed {
        /// Record key
        key: Key,
        /// Validation errors joined into one message
        reason: String,
    },

    /// Optimistic concurrency conflict
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Transaction used after commit or abort
    #[error("Transaction not active (state: {state})")]
    TransactionNotActive {
        /// Current transaction state
        state: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal invariant violation or unavailable component
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `NotFound` error
    pub fn not_found(key: Key) -> Self {
        Error::NotFound { key }
    }

    /// Build an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Build a `Conflict` error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Build a `PreconditionRejected` error
    pub fn precondition_rejected(reason: impl Into<String>) -> Self {
        Error::PreconditionRejected {
            reason: reason.into(),
        }
    }

    /// Build a `WrongType` error
    pub fn wrong_type(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::WrongType {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Build an `Internal` error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// True for optimistic concurrency conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// True if re-running the whole transaction may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// True for missing-entity errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for both precondition kinds
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::PreconditionFailed { .. } | Error::PreconditionRejected { .. }
        )
    }
}

impl From<KeyError> for Error {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::InvalidType { actual } => Error::InvalidKeyType { actual },
            KeyError::Decode(msg) => Error::KeyDecode(msg),
            KeyError::Encode(msg) => Error::Serialization(msg),
            KeyError::InvalidElement(msg) => Error::InvalidArgument(format!("invalid key: {}", msg)),
        }
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
