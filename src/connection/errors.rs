//! # Connection Errors

use thiserror::Error;
use uuid::Uuid;

use super::transaction::TransactionState;

/// Result type for backend connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Backend connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Path is a directory: {0}")]
    IsDirectory(String),

    #[error("Offset {offset} is past the end of {path} ({size} bytes)")]
    InvalidOffset { path: String, offset: u64, size: u64 },

    #[error("MD5 hash of the data written to {0} does not match the provided hash")]
    HashMismatch(String),

    #[error("Transaction {0} is already active on this connection")]
    TransactionAlreadyActive(Uuid),

    #[error("Transaction {0} is attached to another connection")]
    TransactionInProgress(Uuid),

    #[error("No transaction is bound to this connection")]
    NoActiveTransaction,

    #[error("Transaction {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionState,
        to: TransactionState,
    },

    #[error("Transaction journal error: {0}")]
    Journal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectionError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn journal(msg: impl Into<String>) -> Self {
        Self::Journal(msg.into())
    }

    /// Map an I/O error, keeping `NotFound` as a path error
    pub fn io_at(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io(err)
        }
    }
}
