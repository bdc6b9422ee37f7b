//! Operation dispatch
//!
//! Turns a checked request into an `Operation` and runs it through the
//! proxy chain on the caller's worker context.

use super::errors::{ApiError, ApiResult};
use super::method::ApiMethod;
use super::request::ApiRequest;
use super::response::ApiValue;
use crate::core::{
    DeleteOp, ListOp, Operation, ProxyChain, ReadOp, TransferOp, WorkerContext, WriteOp,
};

fn transfer(request: &ApiRequest) -> ApiResult<TransferOp> {
    Ok(TransferOp {
        source_owner: request.string("sourceOwner")?.to_string(),
        source: request.string("source")?.to_string(),
        target_owner: request.string("targetOwner")?.to_string(),
        target: request.string("target")?.to_string(),
    })
}

/// Build the chain operation for a file or transaction method
pub fn to_operation(method: ApiMethod, request: &ApiRequest) -> ApiResult<Operation> {
    let op = match method {
        ApiMethod::List => Operation::List(ListOp {
            owner: request.string("owner")?.to_string(),
            source: request.string("source")?.to_string(),
            recursively: request.bool("recursively")?,
        }),
        ApiMethod::Read => Operation::Read(ReadOp {
            owner: request.string("owner")?.to_string(),
            source: request.string("source")?.to_string(),
            offset: request.long("offset")?,
            limit: request.int("limit")?,
        }),
        ApiMethod::Write => Operation::Write(WriteOp {
            owner: request.string("owner")?.to_string(),
            source: request.string("source")?.to_string(),
            offset: request.long("offset")?,
            data: request.bytes("data")?.to_vec(),
            md5_hash: request.bytes("md5Hash")?.to_vec(),
        }),
        ApiMethod::Delete => Operation::Delete(DeleteOp {
            owner: request.string("owner")?.to_string(),
            source: request.string("source")?.to_string(),
        }),
        ApiMethod::Copy => Operation::Copy(transfer(request)?),
        ApiMethod::Move => Operation::Move(transfer(request)?),
        ApiMethod::Begin => Operation::Begin {
            transaction_id: request.uuid("transactionId")?,
        },
        ApiMethod::Prepare => Operation::Prepare,
        ApiMethod::Commit => Operation::Commit,
        ApiMethod::Rollback => Operation::Rollback,
        ApiMethod::Recover => Operation::Recover,
        ApiMethod::Login | ApiMethod::Logout | ApiMethod::IsSessionValid => {
            return Err(ApiError::internal(format!(
                "Method '{}' is not a file operation",
                method
            )))
        }
    };
    Ok(op)
}

/// Execute a file or transaction method through the chain
pub async fn dispatch(
    chain: &ProxyChain,
    ctx: &mut WorkerContext,
    method: ApiMethod,
    request: &ApiRequest,
) -> ApiResult<ApiValue> {
    let op = to_operation(method, request)?;
    ctx.reset_request();
    let output = chain.execute(&op, ctx).await?;
    Ok(ApiValue::from(output))
}
