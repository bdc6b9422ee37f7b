//! Core Error Types
//!
//! Errors raised inside the proxy chain.

use thiserror::Error;

use super::operation::{OperationKind, Permissions};
use crate::connection::ConnectionError;

/// Core module result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// Authorization provider refused the required permissions. The token
    /// travels in the structured details only, never in the message.
    #[error(
        "{} session does not have rights {permissions} for owner '{owner}' on path '{path}' ({operation})",
        if session_token.is_some() { "Presented" } else { "Anonymous" }
    )]
    AclDenied {
        session_token: Option<String>,
        permissions: Permissions,
        owner: String,
        path: String,
        operation: OperationKind,
    },

    /// Read limit above the configured maximum
    #[error("Read of {limit} bytes from '{path}' exceeds the maximum of {max} bytes")]
    ReadSizeExceeded {
        session_token: Option<String>,
        owner: String,
        path: String,
        limit: i32,
        max: u64,
    },

    #[error("Write of {length} bytes exceeds the maximum of {max} bytes")]
    WriteSizeExceeded { length: usize, max: u64 },

    #[error("Parameter '{parameter}' must not be negative, got {value}")]
    InvalidRange { parameter: &'static str, value: i64 },

    #[error("Invalid path '{path}' for owner '{owner}': {reason}")]
    InvalidPath {
        owner: String,
        path: String,
        reason: &'static str,
    },

    /// Backend failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::AclDenied { .. } => "ACL_DENIED",
            Self::ReadSizeExceeded { .. } => "READ_SIZE_EXCEEDED",
            Self::WriteSizeExceeded { .. } => "WRITE_SIZE_EXCEEDED",
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::InvalidPath { .. } => "INVALID_PATH",
            Self::Connection(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AclDenied { .. } => 403,
            Self::ReadSizeExceeded { .. } | Self::WriteSizeExceeded { .. } => 413,
            Self::InvalidRange { .. } | Self::InvalidPath { .. } => 400,
            Self::Connection(_) | Self::Internal(_) => 500,
        }
    }

    /// Raised before reaching the executor
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Connection(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_denied_message() {
        let err = CoreError::AclDenied {
            session_token: Some("tok".into()),
            permissions: Permissions::READ,
            owner: "bob".into(),
            path: "/".into(),
            operation: OperationKind::List,
        };
        let msg = err.to_string();
        assert!(msg.contains("bob"));
        assert!(msg.contains("List"));
        assert!(!msg.contains("tok"));
        assert_eq!(err.status_code(), 403);
        assert!(err.is_rejection());
    }

    #[test]
    fn test_connection_error_is_internal() {
        let err: CoreError = ConnectionError::NotFound("/a".into()).into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.is_rejection());
    }
}
