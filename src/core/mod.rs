//! # Gateway Core
//!
//! Operation model, per-request context and the proxy chain every file
//! and transaction operation passes through.
//!
//! ## Design Principles
//!
//! - Single operation enum for all requests
//! - Fixed chain order: Authorization → Validation → Logging → Executor
//! - Only the executor resolves physical paths or touches the connection

pub mod context;
pub mod error;
pub mod executor;
pub mod operation;
pub mod pipeline;
pub mod proxy;

pub use context::WorkerContext;
pub use error::{CoreError, CoreResult};
pub use executor::{resolve_path, ExecutorProxy};
pub use operation::{
    DeleteOp, File, FilePermission, ListOp, Operation, OperationKind, OperationOutput,
    Permissions, ReadOp, TransferOp, WriteOp,
};
pub use pipeline::{
    Next, OperationExecutor, OperationFuture, OperationResult, Proxy, ProxyChain,
    ProxyChainBuilder,
};
pub use proxy::{AuthorizationProxy, LoggingProxy, ValidationProxy};
