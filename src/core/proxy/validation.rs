//! Validation Proxy
//!
//! Request-shape gate: size limits, ranges and path syntax. Runs after
//! authorization and before anything reaches the backend.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::context::WorkerContext;
use crate::core::error::{CoreError, CoreResult};
use crate::core::operation::Operation;
use crate::core::pipeline::{Next, OperationFuture, Proxy};

fn is_valid_owner(owner: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(owner))
}

/// Reject owners that are not plain names and paths that could escape
/// the owner's namespace
pub fn check_path(owner: &str, path: &str) -> CoreResult<()> {
    let invalid = |reason| CoreError::InvalidPath {
        owner: owner.to_string(),
        path: path.to_string(),
        reason,
    };

    if !is_valid_owner(owner) {
        return Err(invalid("owner must match [A-Za-z0-9][A-Za-z0-9._-]*"));
    }
    if path.contains('\0') {
        return Err(invalid("path contains a NUL byte"));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("path contains a '..' segment"));
    }
    Ok(())
}

/// Shape gate
pub struct ValidationProxy {
    max_read_size_in_bytes: u64,
    max_write_size_in_bytes: Option<u64>,
}

impl ValidationProxy {
    pub fn new(max_read_size_in_bytes: u64) -> Self {
        Self {
            max_read_size_in_bytes,
            max_write_size_in_bytes: None,
        }
    }

    /// Also cap the payload of a single write
    pub fn with_max_write_size(mut self, max_write_size_in_bytes: u64) -> Self {
        self.max_write_size_in_bytes = Some(max_write_size_in_bytes);
        self
    }

    fn validate(&self, op: &Operation, ctx: &WorkerContext) -> CoreResult<()> {
        match op {
            Operation::List(list) => check_path(&list.owner, &list.source),
            Operation::Read(read) => {
                check_path(&read.owner, &read.source)?;
                non_negative("offset", read.offset)?;
                non_negative("limit", i64::from(read.limit))?;
                if read.limit as u64 > self.max_read_size_in_bytes {
                    return Err(CoreError::ReadSizeExceeded {
                        session_token: ctx.session_token.clone(),
                        owner: read.owner.clone(),
                        path: read.source.clone(),
                        limit: read.limit,
                        max: self.max_read_size_in_bytes,
                    });
                }
                Ok(())
            }
            Operation::Write(write) => {
                check_path(&write.owner, &write.source)?;
                non_negative("offset", write.offset)?;
                match self.max_write_size_in_bytes {
                    Some(max) if write.data.len() as u64 > max => {
                        Err(CoreError::WriteSizeExceeded {
                            length: write.data.len(),
                            max,
                        })
                    }
                    _ => Ok(()),
                }
            }
            Operation::Delete(delete) => check_path(&delete.owner, &delete.source),
            Operation::Copy(transfer) | Operation::Move(transfer) => {
                check_path(&transfer.source_owner, &transfer.source)?;
                check_path(&transfer.target_owner, &transfer.target)
            }
            Operation::Begin { .. }
            | Operation::Prepare
            | Operation::Commit
            | Operation::Rollback
            | Operation::Recover => Ok(()),
        }
    }
}

fn non_negative(parameter: &'static str, value: i64) -> CoreResult<()> {
    if value < 0 {
        return Err(CoreError::InvalidRange { parameter, value });
    }
    Ok(())
}

impl Proxy for ValidationProxy {
    fn process<'a>(
        &'a self,
        op: &'a Operation,
        ctx: &'a mut WorkerContext,
        next: Next<'a>,
    ) -> OperationFuture<'a> {
        Box::pin(async move {
            self.validate(op, ctx)?;
            next.run(op, ctx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_accepted() {
        assert!(check_path("alice", "/docs/a.txt").is_ok());
        assert!(check_path("team.b-2", "/").is_ok());
        assert!(check_path("alice", "").is_ok());
        assert!(check_path("alice", "/a..b/c").is_ok());
    }

    #[test]
    fn test_parent_segment_rejected() {
        let err = check_path("alice", "/docs/../../bob/x").unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath { reason, .. } if reason.contains("..")));
    }

    #[test]
    fn test_bad_owner_rejected() {
        assert!(check_path("", "/").is_err());
        assert!(check_path("../bob", "/").is_err());
        assert!(check_path("a/b", "/").is_err());
        assert!(check_path(".hidden", "/").is_err());
    }

    #[test]
    fn test_nul_rejected() {
        assert!(check_path("alice", "/a\0b").is_err());
    }
}
