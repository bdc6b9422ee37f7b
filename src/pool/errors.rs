//! # Pool Errors

use thiserror::Error;

use crate::connection::ConnectionError;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Worker pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Fail-fast policy and every worker is checked out
    #[error("All {max_workers} workers are checked out")]
    Exhausted { max_workers: usize },

    #[error("No worker became available within {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    /// Creating a fresh connection failed
    #[error("Failed to open a backend connection: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Worker pool is closed")]
    Closed,
}

impl PoolError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            PoolError::Exhausted { .. } | PoolError::Timeout { .. } | PoolError::Closed => 503,
            PoolError::Connection(_) => 500,
        }
    }
}
