//! Error types for SEENMARK operations

use crate::{ItemId, UserId};
use thiserror::Error;

/// Outcome taxonomy surfaced to callers of the seen-tracking components.
///
/// None of these are fatal. `Conflict` never reaches a caller: a lost create
/// race is folded into success by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("Required identifier missing")]
    MissingParameters,

    #[error("Write attempt rate limited")]
    RateLimited,

    #[error("Seen record already created by another writer")]
    Conflict,

    #[error("Remote seen-record write failed")]
    WriteFailed,

    #[error("Persistent cache tier unavailable, using session tier only")]
    StorageDegraded,
}

/// Remote seen-record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteStoreError {
    #[error("Seen record already exists for user {user_id} and item {item_id}")]
    AlreadyExists { user_id: UserId, item_id: ItemId },

    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Remote store rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("Remote store lock poisoned")]
    LockPoisoned,
}

impl RemoteStoreError {
    /// True for the already-exists class of failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteStoreError::AlreadyExists { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_conflict() {
            ErrorKind::Conflict
        } else {
            ErrorKind::WriteFailed
        }
    }
}

/// Persistent cache tier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Persistence backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization error for user {user_id}: {reason}")]
    Serialization { user_id: UserId, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },

    #[error("Persistence lock poisoned")]
    LockPoisoned,
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io {
            reason: e.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all SEENMARK errors.
#[derive(Debug, Clone, Error)]
pub enum SeenError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteStoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SeenError {
    /// Map onto the caller-facing taxonomy where one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SeenError::Remote(e) => Some(e.kind()),
            SeenError::Persistence(_) => Some(ErrorKind::StorageDegraded),
            SeenError::Config(_) => None,
        }
    }
}

/// Result type alias for SEENMARK operations.
pub type SeenResult<T> = Result<T, SeenError>;

// =============================================================================
// TESTS
// =============================================================================
