//! Error types for banlist-state

use thiserror::Error;

use crate::schema::CollectionKind;

/// Errors that can occur in the state persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem error while reading or replacing a collection
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Persisted collection does not match its schema
    #[error("Collection {key} is corrupt: {reason}")]
    Corrupt { key: CollectionKind, reason: String },

    /// Another writer held the store lock past the allowed wait
    #[error("Store lock still held after {waited_ms}ms")]
    LockTimeout { waited_ms: u64 },
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StateError {
    fn from(err: tokio::task::JoinError) -> Self {
        StateError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}
