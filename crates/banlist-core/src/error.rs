//! Error types for access-control operations.
//!
//! Every variant is recoverable; callers render them for the user and keep
//! going.

use banlist_state::StateError;

/// Errors produced by access-control operations.
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("invalid duration format: {input:?}")]
    InvalidFormat { input: String },

    #[error("record for {user_id} is permanent and cannot be extended")]
    AlreadyPermanent { user_id: String },

    #[error("no record for {user_id}")]
    NotFound { user_id: String },

    #[error("record for {user_id} is permanent; remove it with a zero duration instead")]
    CannotDecrementPermanent { user_id: String },

    #[error("timed out after {waited_ms}ms waiting for the state lock")]
    LockTimeout { waited_ms: u64 },

    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl AclError {
    /// Short machine-readable code for dispatchers.
    pub fn code(&self) -> &'static str {
        match self {
            AclError::InvalidFormat { .. } => "invalid_format",
            AclError::AlreadyPermanent { .. } => "already_permanent",
            AclError::NotFound { .. } => "not_found",
            AclError::CannotDecrementPermanent { .. } => "cannot_decrement_permanent",
            AclError::LockTimeout { .. } => "lock_timeout",
            AclError::State(_) => "state",
        }
    }
}

/// Result type for access-control operations.
pub type AclResult<T> = std::result::Result<T, AclError>;
