//! Observability events for the gateway
//!
//! Every lifecycle step that is logged has a variant here. Events are
//! explicit and typed.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Gateway startup begins
    BootStart,
    /// Gateway startup complete
    BootComplete,
    /// HTTP listener bound and serving
    Serving,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,

    // Configuration
    ConfigLoaded,

    // Sessions
    LoginSucceeded,
    LoginFailed,
    Logout,
    /// Expired sessions dropped by the reaper
    SessionsPurged,

    // Worker pool
    /// Worker handed to a request
    WorkerCheckout,
    /// Worker returned for reuse
    WorkerCheckin,
    /// Worker connection dropped after an error
    WorkerDiscard,
    /// Idle interactive worker reclaimed by the reaper
    WorkerReaped,
    /// No worker available within the checkout policy
    PoolExhausted,

    // Transactions
    TransactionBegin,
    TransactionPrepare,
    TransactionCommit,
    TransactionRollback,
    TransactionRecover,

    // Operations
    /// Operation reached the executor and succeeded
    OperationExecuted,
    /// Operation refused by authorization or validation
    OperationRejected,
    /// Backend failure while executing an operation
    OperationFailed,

    // Archive streaming
    ArchiveStreamStart,
    ArchiveStreamComplete,
    ArchiveStreamAborted,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "AFSGATE_STARTUP_BEGIN",
            Event::BootComplete => "AFSGATE_STARTUP_COMPLETE",
            Event::Serving => "AFSGATE_SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::LoginSucceeded => "LOGIN_SUCCEEDED",
            Event::LoginFailed => "LOGIN_FAILED",
            Event::Logout => "LOGOUT",
            Event::SessionsPurged => "SESSIONS_PURGED",

            Event::WorkerCheckout => "WORKER_CHECKOUT",
            Event::WorkerCheckin => "WORKER_CHECKIN",
            Event::WorkerDiscard => "WORKER_DISCARD",
            Event::WorkerReaped => "WORKER_REAPED",
            Event::PoolExhausted => "POOL_EXHAUSTED",

            Event::TransactionBegin => "TRANSACTION_BEGIN",
            Event::TransactionPrepare => "TRANSACTION_PREPARE",
            Event::TransactionCommit => "TRANSACTION_COMMIT",
            Event::TransactionRollback => "TRANSACTION_ROLLBACK",
            Event::TransactionRecover => "TRANSACTION_RECOVER",

            Event::OperationExecuted => "OPERATION_EXECUTED",
            Event::OperationRejected => "OPERATION_REJECTED",
            Event::OperationFailed => "OPERATION_FAILED",

            Event::ArchiveStreamStart => "ARCHIVE_STREAM_BEGIN",
            Event::ArchiveStreamComplete => "ARCHIVE_STREAM_COMPLETE",
            Event::ArchiveStreamAborted => "ARCHIVE_STREAM_ABORTED",
        }
    }

    /// Events that indicate something went wrong
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::LoginFailed
                | Event::WorkerDiscard
                | Event::PoolExhausted
                | Event::OperationFailed
                | Event::ArchiveStreamAborted
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
