//! Unified Operation Model
//!
//! Every file and transaction operation routes through this enum.
//! Proxies match on it instead of exposing one method per operation.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Operation tag, used for permission lookup, logging and error details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    List,
    Read,
    Write,
    Delete,
    Copy,
    Move,
    Begin,
    Prepare,
    Commit,
    Rollback,
    Recover,
}

impl OperationKind {
    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Begin => "begin",
            Self::Prepare => "prepare",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Recover => "recover",
        }
    }

    /// Whether this is one of the two-phase-commit control operations
    pub fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            Self::Begin | Self::Prepare | Self::Commit | Self::Rollback | Self::Recover
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "List",
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Delete => "Delete",
            Self::Copy => "Copy",
            Self::Move => "Move",
            Self::Begin => "Begin",
            Self::Prepare => "Prepare",
            Self::Commit => "Commit",
            Self::Rollback => "Rollback",
            Self::Recover => "Recover",
        };
        f.write_str(name)
    }
}

/// A single file capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilePermission {
    Read,
    Write,
}

/// Set of file capabilities required by, or granted for, an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions {
    read: bool,
    write: bool,
}

impl Permissions {
    pub const NONE: Self = Self {
        read: false,
        write: false,
    };
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };

    pub fn contains(&self, permission: FilePermission) -> bool {
        match permission {
            FilePermission::Read => self.read,
            FilePermission::Write => self.write,
        }
    }

    /// True when every permission in `other` is also in `self`
    pub fn contains_all(&self, other: Permissions) -> bool {
        (!other.read || self.read) && (!other.write || self.write)
    }

    pub fn union(self, other: Permissions) -> Self {
        Self {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.read && !self.write
    }

    pub fn iter(&self) -> impl Iterator<Item = FilePermission> {
        let mut set = BTreeSet::new();
        if self.read {
            set.insert(FilePermission::Read);
        }
        if self.write {
            set.insert(FilePermission::Write);
        }
        set.into_iter()
    }
}

impl FromIterator<FilePermission> for Permissions {
    fn from_iter<I: IntoIterator<Item = FilePermission>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, |acc, p| match p {
            FilePermission::Read => acc.union(Self::READ),
            FilePermission::Write => acc.union(Self::WRITE),
        })
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter()
            .map(|p| match p {
                FilePermission::Read => "Read",
                FilePermission::Write => "Write",
            })
            .collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl Serialize for Permissions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<FilePermission>::deserialize(deserializer)?;
        Ok(list.into_iter().collect())
    }
}

/// All operations in the gateway route through this enum
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    List(ListOp),
    Read(ReadOp),
    Write(WriteOp),
    Delete(DeleteOp),
    Copy(TransferOp),
    Move(TransferOp),
    Begin { transaction_id: Uuid },
    Prepare,
    Commit,
    Rollback,
    Recover,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::List(_) => OperationKind::List,
            Self::Read(_) => OperationKind::Read,
            Self::Write(_) => OperationKind::Write,
            Self::Delete(_) => OperationKind::Delete,
            Self::Copy(_) => OperationKind::Copy,
            Self::Move(_) => OperationKind::Move,
            Self::Begin { .. } => OperationKind::Begin,
            Self::Prepare => OperationKind::Prepare,
            Self::Commit => OperationKind::Commit,
            Self::Rollback => OperationKind::Rollback,
            Self::Recover => OperationKind::Recover,
        }
    }

    /// Get operation name for metrics/logging
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Owner of the primary (source) path, if the operation has one
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::List(op) => Some(&op.owner),
            Self::Read(op) => Some(&op.owner),
            Self::Write(op) => Some(&op.owner),
            Self::Delete(op) => Some(&op.owner),
            Self::Copy(op) | Self::Move(op) => Some(&op.source_owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListOp {
    pub owner: String,
    pub source: String,
    pub recursively: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOp {
    pub owner: String,
    pub source: String,
    pub offset: i64,
    pub limit: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub owner: String,
    pub source: String,
    pub offset: i64,
    pub data: Vec<u8>,
    pub md5_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOp {
    pub owner: String,
    pub source: String,
}

/// Copy and move share the same shape
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOp {
    pub source_owner: String,
    pub source: String,
    pub target_owner: String,
    pub target: String,
}

/// File descriptor returned by `List`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub owner: String,
    /// Path relative to the owner
    pub path: String,
    pub name: String,
    pub directory: bool,
    pub size: Option<u64>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_access_time: Option<DateTime<Utc>>,
}

/// Result of an operation that made it through the chain
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Files(Vec<File>),
    Bytes(Vec<u8>),
    Flag(bool),
    Done,
    TransactionIds(Vec<Uuid>),
}

impl OperationOutput {
    /// JSON rendering for non-binary results
    pub fn to_json(&self) -> Value {
        match self {
            Self::Files(files) => json!(files),
            Self::Bytes(bytes) => json!(bytes),
            Self::Flag(flag) => Value::Bool(*flag),
            Self::Done => Value::Null,
            Self::TransactionIds(ids) => json!(ids),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }
}
