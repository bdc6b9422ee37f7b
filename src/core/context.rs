//! Worker Context
//!
//! Per-request state threaded through the proxy chain. A context owns its
//! connection exclusively and is never shared between concurrent requests.

use std::fmt;
use std::time::Instant;

use uuid::Uuid;

use crate::connection::Connection;

/// Context carried through the proxy chain
pub struct WorkerContext {
    /// Request ID for tracing
    pub request_id: Uuid,

    /// Session token presented by the caller
    pub session_token: Option<String>,

    /// Transaction bound by `Begin`, cleared by `Commit`/`Rollback`
    pub transaction_id: Option<Uuid>,

    /// Request came from the external transaction manager
    pub transaction_manager_mode: bool,

    connection: Box<dyn Connection>,

    /// Start time for duration tracking
    started_at: Instant,
}

impl WorkerContext {
    /// Create a context around a checked-out connection
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session_token: None,
            transaction_id: connection.transaction_id(),
            transaction_manager_mode: false,
            connection,
            started_at: Instant::now(),
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }

    /// Give the connection back, e.g. for check-in
    pub fn into_connection(self) -> Box<dyn Connection> {
        self.connection
    }

    pub fn set_transaction(&mut self, transaction_id: Uuid) {
        self.transaction_id = Some(transaction_id);
    }

    pub fn clear_transaction(&mut self) {
        self.transaction_id = None;
    }

    /// Start a new request on the same connection
    pub fn reset_request(&mut self) {
        self.request_id = Uuid::new_v4();
        self.started_at = Instant::now();
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("request_id", &self.request_id)
            .field("has_session_token", &self.session_token.is_some())
            .field("transaction_id", &self.transaction_id)
            .field("transaction_manager_mode", &self.transaction_manager_mode)
            .finish_non_exhaustive()
    }
}
