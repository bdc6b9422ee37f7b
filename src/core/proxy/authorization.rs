//! Authorization Proxy
//!
//! Asks the authorization provider whether the session holds the
//! permissions each operation needs on each owner it touches.
//!
//! | Operation     | Source      | Target |
//! |---------------|-------------|--------|
//! | List, Read    | Read        | -      |
//! | Write, Delete | Write       | -      |
//! | Copy          | Read        | Write  |
//! | Move          | Read, Write | Write  |
//!
//! Source is checked before target; either refusal stops the chain.

use std::sync::Arc;

use crate::auth::AuthorizationInfoProvider;
use crate::core::context::WorkerContext;
use crate::core::error::CoreError;
use crate::core::operation::{Operation, Permissions};
use crate::core::pipeline::{Next, OperationFuture, Proxy};

/// One permission check: owner, relative path, required set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RightsCheck<'a> {
    pub owner: &'a str,
    pub path: &'a str,
    pub permissions: Permissions,
}

/// Checks `op` needs, in evaluation order
pub fn required_rights(op: &Operation) -> Vec<RightsCheck<'_>> {
    match op {
        Operation::List(op) => vec![RightsCheck {
            owner: &op.owner,
            path: &op.source,
            permissions: Permissions::READ,
        }],
        Operation::Read(op) => vec![RightsCheck {
            owner: &op.owner,
            path: &op.source,
            permissions: Permissions::READ,
        }],
        Operation::Write(op) => vec![RightsCheck {
            owner: &op.owner,
            path: &op.source,
            permissions: Permissions::WRITE,
        }],
        Operation::Delete(op) => vec![RightsCheck {
            owner: &op.owner,
            path: &op.source,
            permissions: Permissions::WRITE,
        }],
        Operation::Copy(op) => vec![
            RightsCheck {
                owner: &op.source_owner,
                path: &op.source,
                permissions: Permissions::READ,
            },
            RightsCheck {
                owner: &op.target_owner,
                path: &op.target,
                permissions: Permissions::WRITE,
            },
        ],
        Operation::Move(op) => vec![
            RightsCheck {
                owner: &op.source_owner,
                path: &op.source,
                permissions: Permissions::READ_WRITE,
            },
            RightsCheck {
                owner: &op.target_owner,
                path: &op.target,
                permissions: Permissions::WRITE,
            },
        ],
        Operation::Begin { .. }
        | Operation::Prepare
        | Operation::Commit
        | Operation::Rollback
        | Operation::Recover => Vec::new(),
    }
}

/// Permission gate
pub struct AuthorizationProxy {
    provider: Arc<dyn AuthorizationInfoProvider>,
}

impl AuthorizationProxy {
    pub fn new(provider: Arc<dyn AuthorizationInfoProvider>) -> Self {
        Self { provider }
    }

    fn check_rights(
        &self,
        op: &Operation,
        ctx: &WorkerContext,
        check: &RightsCheck<'_>,
    ) -> Result<(), CoreError> {
        if self
            .provider
            .has_rights(ctx.session_token(), check.owner, check.permissions)
        {
            return Ok(());
        }
        Err(CoreError::AclDenied {
            session_token: ctx.session_token.clone(),
            permissions: check.permissions,
            owner: check.owner.to_string(),
            path: check.path.to_string(),
            operation: op.kind(),
        })
    }
}

impl Proxy for AuthorizationProxy {
    fn process<'a>(
        &'a self,
        op: &'a Operation,
        ctx: &'a mut WorkerContext,
        next: Next<'a>,
    ) -> OperationFuture<'a> {
        Box::pin(async move {
            for check in required_rights(op) {
                self.check_rights(op, ctx, &check)?;
            }
            next.run(op, ctx).await
        })
    }
}
