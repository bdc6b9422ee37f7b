//! Proxy Chain
//!
//! Deterministic interceptor pipeline for all file operations.
//! Standard order: Authorization → Validation → Logging → Executor

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use uuid::Uuid;

use super::context::WorkerContext;
use super::error::{CoreError, CoreResult};
use super::executor::ExecutorProxy;
use super::operation::{
    DeleteOp, File, ListOp, Operation, OperationOutput, ReadOp, TransferOp, WriteOp,
};
use super::proxy::{AuthorizationProxy, LoggingProxy, ValidationProxy};
use crate::auth::AuthorizationInfoProvider;
use crate::observability::{Event, Logger, MetricsRegistry};

/// Result of an operation
pub type OperationResult = CoreResult<OperationOutput>;

/// Boxed future returned by every chain link
pub type OperationFuture<'a> = Pin<Box<dyn Future<Output = OperationResult> + Send + 'a>>;

/// A link in the chain. Either forwards through `next` or fails without
/// calling it.
pub trait Proxy: Send + Sync {
    fn process<'a>(
        &'a self,
        op: &'a Operation,
        ctx: &'a mut WorkerContext,
        next: Next<'a>,
    ) -> OperationFuture<'a>;
}

/// Next proxy in chain
pub struct Next<'a> {
    proxies: &'a [Arc<dyn Proxy>],
    executor: &'a dyn OperationExecutor,
}

impl<'a> Next<'a> {
    /// Run the next proxy or the executor
    pub fn run(self, op: &'a Operation, ctx: &'a mut WorkerContext) -> OperationFuture<'a> {
        Box::pin(async move {
            if let Some((first, rest)) = self.proxies.split_first() {
                let next = Next {
                    proxies: rest,
                    executor: self.executor,
                };
                first.process(op, ctx, next).await
            } else {
                self.executor.execute(op, ctx).await
            }
        })
    }
}

/// Terminal stage of the chain
pub trait OperationExecutor: Send + Sync {
    fn execute<'a>(&'a self, op: &'a Operation, ctx: &'a mut WorkerContext)
        -> OperationFuture<'a>;
}

/// Composed proxy chain
pub struct ProxyChain {
    proxies: Vec<Arc<dyn Proxy>>,
    executor: Arc<dyn OperationExecutor>,
    /// Counts refusals, which never reach the logging link
    rejections: Option<Arc<MetricsRegistry>>,
}

impl ProxyChain {
    /// Create a chain that goes straight to the executor
    pub fn new(executor: impl OperationExecutor + 'static) -> Self {
        Self {
            proxies: Vec::new(),
            executor: Arc::new(executor),
            rejections: None,
        }
    }

    /// Authorization → Validation → Logging → Executor
    pub fn standard(
        provider: Arc<dyn AuthorizationInfoProvider>,
        max_read_size_in_bytes: u64,
        max_write_size_in_bytes: u64,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        ProxyChainBuilder::new()
            .with(AuthorizationProxy::new(provider))
            .with(ValidationProxy::new(max_read_size_in_bytes).with_max_write_size(max_write_size_in_bytes))
            .with(LoggingProxy::new(Arc::clone(&metrics)))
            .build(ExecutorProxy)
            .with_rejection_metrics(metrics)
    }

    pub fn with_rejection_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.rejections = Some(metrics);
        self
    }

    /// Append a proxy; proxies run in insertion order
    pub fn with_proxy(mut self, proxy: impl Proxy + 'static) -> Self {
        self.proxies.push(Arc::new(proxy));
        self
    }

    /// Execute an operation through the chain
    pub async fn execute(&self, op: &Operation, ctx: &mut WorkerContext) -> OperationResult {
        let next = Next {
            proxies: &self.proxies,
            executor: self.executor.as_ref(),
        };
        let result = next.run(op, ctx).await;
        if let Err(e) = &result {
            if e.is_rejection() {
                self.record_rejection(op, ctx, e);
            }
        }
        result
    }

    fn record_rejection(&self, op: &Operation, ctx: &WorkerContext, err: &CoreError) {
        if let Some(metrics) = &self.rejections {
            metrics.increment_operations_rejected();
        }
        let request_id = ctx.request_id.to_string();
        let reason = err.to_string();
        Logger::warn(
            Event::OperationRejected.as_str(),
            &[
                ("request_id", request_id.as_str()),
                ("operation", op.name()),
                ("owner", op.owner().unwrap_or("")),
                ("code", err.code()),
                ("reason", reason.as_str()),
            ],
        );
    }

    /// Get the number of proxies ahead of the executor
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    pub async fn list(
        &self,
        ctx: &mut WorkerContext,
        owner: &str,
        source: &str,
        recursively: bool,
    ) -> CoreResult<Vec<File>> {
        let op = Operation::List(ListOp {
            owner: owner.to_string(),
            source: source.to_string(),
            recursively,
        });
        match self.execute(&op, ctx).await? {
            OperationOutput::Files(files) => Ok(files),
            other => Err(unexpected(&op, &other)),
        }
    }

    pub async fn read(
        &self,
        ctx: &mut WorkerContext,
        owner: &str,
        source: &str,
        offset: i64,
        limit: i32,
    ) -> CoreResult<Vec<u8>> {
        let op = Operation::Read(ReadOp {
            owner: owner.to_string(),
            source: source.to_string(),
            offset,
            limit,
        });
        match self.execute(&op, ctx).await? {
            OperationOutput::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(&op, &other)),
        }
    }

    pub async fn write(
        &self,
        ctx: &mut WorkerContext,
        owner: &str,
        source: &str,
        offset: i64,
        data: Vec<u8>,
        md5_hash: Vec<u8>,
    ) -> CoreResult<bool> {
        let op = Operation::Write(WriteOp {
            owner: owner.to_string(),
            source: source.to_string(),
            offset,
            data,
            md5_hash,
        });
        self.execute_flag(op, ctx).await
    }

    pub async fn delete(
        &self,
        ctx: &mut WorkerContext,
        owner: &str,
        source: &str,
    ) -> CoreResult<bool> {
        let op = Operation::Delete(DeleteOp {
            owner: owner.to_string(),
            source: source.to_string(),
        });
        self.execute_flag(op, ctx).await
    }

    pub async fn copy(
        &self,
        ctx: &mut WorkerContext,
        source_owner: &str,
        source: &str,
        target_owner: &str,
        target: &str,
    ) -> CoreResult<bool> {
        let op = Operation::Copy(transfer(source_owner, source, target_owner, target));
        self.execute_flag(op, ctx).await
    }

    pub async fn r#move(
        &self,
        ctx: &mut WorkerContext,
        source_owner: &str,
        source: &str,
        target_owner: &str,
        target: &str,
    ) -> CoreResult<bool> {
        let op = Operation::Move(transfer(source_owner, source, target_owner, target));
        self.execute_flag(op, ctx).await
    }

    pub async fn begin(&self, ctx: &mut WorkerContext, transaction_id: Uuid) -> CoreResult<()> {
        self.execute(&Operation::Begin { transaction_id }, ctx)
            .await
            .map(|_| ())
    }

    pub async fn prepare(&self, ctx: &mut WorkerContext) -> CoreResult<bool> {
        self.execute_flag(Operation::Prepare, ctx).await
    }

    pub async fn commit(&self, ctx: &mut WorkerContext) -> CoreResult<()> {
        self.execute(&Operation::Commit, ctx).await.map(|_| ())
    }

    pub async fn rollback(&self, ctx: &mut WorkerContext) -> CoreResult<()> {
        self.execute(&Operation::Rollback, ctx).await.map(|_| ())
    }

    pub async fn recover(&self, ctx: &mut WorkerContext) -> CoreResult<Vec<Uuid>> {
        let op = Operation::Recover;
        match self.execute(&op, ctx).await? {
            OperationOutput::TransactionIds(ids) => Ok(ids),
            other => Err(unexpected(&op, &other)),
        }
    }

    async fn execute_flag(&self, op: Operation, ctx: &mut WorkerContext) -> CoreResult<bool> {
        match self.execute(&op, ctx).await? {
            OperationOutput::Flag(flag) => Ok(flag),
            other => Err(unexpected(&op, &other)),
        }
    }
}

fn transfer(source_owner: &str, source: &str, target_owner: &str, target: &str) -> TransferOp {
    TransferOp {
        source_owner: source_owner.to_string(),
        source: source.to_string(),
        target_owner: target_owner.to_string(),
        target: target.to_string(),
    }
}

fn unexpected(op: &Operation, output: &OperationOutput) -> CoreError {
    CoreError::internal(format!(
        "unexpected output for {}: {:?}",
        op.name(),
        std::mem::discriminant(output)
    ))
}

/// Builder for chain construction
pub struct ProxyChainBuilder {
    proxies: Vec<Arc<dyn Proxy>>,
}

impl ProxyChainBuilder {
    pub fn new() -> Self {
        Self {
            proxies: Vec::new(),
        }
    }

    /// Add proxy
    pub fn with(mut self, proxy: impl Proxy + 'static) -> Self {
        self.proxies.push(Arc::new(proxy));
        self
    }

    /// Build the chain with the given executor
    pub fn build(self, executor: impl OperationExecutor + 'static) -> ProxyChain {
        ProxyChain {
            proxies: self.proxies,
            executor: Arc::new(executor),
            rejections: None,
        }
    }
}

impl Default for ProxyChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
