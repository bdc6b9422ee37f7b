//! Executor Proxy
//!
//! Terminal link of the chain. The only place where `(owner, relative
//! path)` pairs become physical backend paths, and the only place that
//! touches the worker's connection.

use crate::connection::RawFile;
use crate::core::context::WorkerContext;
use crate::core::error::{CoreError, CoreResult};
use crate::core::operation::{File, Operation, OperationOutput};
use crate::core::pipeline::{OperationExecutor, OperationFuture, OperationResult};

/// Join owner and relative path with exactly one separator between them
///
/// `resolve_path("alice", "/docs/a.txt") == "/alice/docs/a.txt"`
pub fn resolve_path(owner: &str, relative: &str) -> String {
    if relative.is_empty() || relative.starts_with('/') {
        format!("/{}{}", owner, relative)
    } else {
        format!("/{}/{}", owner, relative)
    }
}

/// Inverse of `resolve_path` for paths the backend reports
fn relative_path(owner: &str, physical: &str) -> String {
    let prefix = format!("/{}", owner);
    match physical.strip_prefix(&prefix) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => physical.to_string(),
    }
}

fn to_file(owner: &str, raw: RawFile) -> File {
    File {
        owner: owner.to_string(),
        path: relative_path(owner, &raw.path),
        name: raw.name,
        directory: raw.directory,
        size: raw.size,
        last_modified_time: raw.last_modified_time,
        creation_time: raw.creation_time,
        last_access_time: raw.last_access_time,
    }
}

fn unsigned<T: TryFrom<i64>>(parameter: &'static str, value: i64) -> CoreResult<T> {
    T::try_from(value).map_err(|_| CoreError::InvalidRange { parameter, value })
}

/// Executes operations against the context's connection
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutorProxy;

impl ExecutorProxy {
    fn run(op: &Operation, ctx: &mut WorkerContext) -> OperationResult {
        let output = match op {
            Operation::List(list) => {
                let raw = ctx
                    .connection_mut()
                    .list(&resolve_path(&list.owner, &list.source), list.recursively)?;
                OperationOutput::Files(
                    raw.into_iter().map(|f| to_file(&list.owner, f)).collect(),
                )
            }
            Operation::Read(read) => {
                let offset: u64 = unsigned("offset", read.offset)?;
                let limit: u32 = unsigned("limit", i64::from(read.limit))?;
                OperationOutput::Bytes(ctx.connection_mut().read(
                    &resolve_path(&read.owner, &read.source),
                    offset,
                    limit,
                )?)
            }
            Operation::Write(write) => {
                let offset: u64 = unsigned("offset", write.offset)?;
                OperationOutput::Flag(ctx.connection_mut().write(
                    &resolve_path(&write.owner, &write.source),
                    offset,
                    &write.data,
                    &write.md5_hash,
                )?)
            }
            Operation::Delete(delete) => OperationOutput::Flag(
                ctx.connection_mut()
                    .delete(&resolve_path(&delete.owner, &delete.source))?,
            ),
            Operation::Copy(copy) => OperationOutput::Flag(ctx.connection_mut().copy(
                &resolve_path(&copy.source_owner, &copy.source),
                &resolve_path(&copy.target_owner, &copy.target),
            )?),
            Operation::Move(transfer) => OperationOutput::Flag(ctx.connection_mut().r#move(
                &resolve_path(&transfer.source_owner, &transfer.source),
                &resolve_path(&transfer.target_owner, &transfer.target),
            )?),
            Operation::Begin { transaction_id } => {
                ctx.connection_mut().begin(*transaction_id)?;
                ctx.set_transaction(*transaction_id);
                OperationOutput::Done
            }
            Operation::Prepare => OperationOutput::Flag(ctx.connection_mut().prepare()?),
            Operation::Commit => {
                ctx.connection_mut().commit()?;
                ctx.clear_transaction();
                OperationOutput::Done
            }
            Operation::Rollback => {
                ctx.connection_mut().rollback()?;
                ctx.clear_transaction();
                OperationOutput::Done
            }
            Operation::Recover => {
                OperationOutput::TransactionIds(ctx.connection_mut().recover()?)
            }
        };
        Ok(output)
    }
}

impl OperationExecutor for ExecutorProxy {
    fn execute<'a>(
        &'a self,
        op: &'a Operation,
        ctx: &'a mut WorkerContext,
    ) -> OperationFuture<'a> {
        Box::pin(async move { Self::run(op, ctx) })
    }
}
