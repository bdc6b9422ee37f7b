//! API method table
//!
//! Fixed binding of every wire method to its transport verb and its
//! declared parameter list.

use std::fmt;

use axum::http::Method;

use crate::core::OperationKind;

/// Declared primitive type of a wire parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Long,
    Int,
    Uuid,
    /// Base64 on the wire
    Bytes,
    String,
}

impl ParamType {
    /// Type declared for a parameter key, independent of the method
    pub fn of(key: &str) -> Self {
        match key {
            "recursively" => ParamType::Bool,
            "offset" => ParamType::Long,
            "limit" => ParamType::Int,
            "transactionId" => ParamType::Uuid,
            "data" | "md5Hash" => ParamType::Bytes,
            _ => ParamType::String,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Bool => "Boolean",
            ParamType::Long => "Long",
            ParamType::Int => "Integer",
            ParamType::Uuid => "UUID",
            ParamType::Bytes => "byte[]",
            ParamType::String => "String",
        }
    }
}

/// Every method reachable through the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
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
    Login,
    Logout,
    IsSessionValid,
}

const OWNER_SOURCE: &[&str] = &["owner", "source"];
const TRANSFER: &[&str] = &["sourceOwner", "source", "targetOwner", "target"];

impl ApiMethod {
    pub const ALL: [ApiMethod; 14] = [
        ApiMethod::List,
        ApiMethod::Read,
        ApiMethod::Write,
        ApiMethod::Delete,
        ApiMethod::Copy,
        ApiMethod::Move,
        ApiMethod::Begin,
        ApiMethod::Prepare,
        ApiMethod::Commit,
        ApiMethod::Rollback,
        ApiMethod::Recover,
        ApiMethod::Login,
        ApiMethod::Logout,
        ApiMethod::IsSessionValid,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiMethod::List => "list",
            ApiMethod::Read => "read",
            ApiMethod::Write => "write",
            ApiMethod::Delete => "delete",
            ApiMethod::Copy => "copy",
            ApiMethod::Move => "move",
            ApiMethod::Begin => "begin",
            ApiMethod::Prepare => "prepare",
            ApiMethod::Commit => "commit",
            ApiMethod::Rollback => "rollback",
            ApiMethod::Recover => "recover",
            ApiMethod::Login => "login",
            ApiMethod::Logout => "logout",
            ApiMethod::IsSessionValid => "isSessionValid",
        }
    }

    /// Transport verb the method must arrive with. GET parameters come on
    /// the query string, POST and DELETE parameters in the body.
    pub fn http_method(&self) -> Method {
        match self {
            ApiMethod::List | ApiMethod::Read | ApiMethod::IsSessionValid => Method::GET,
            ApiMethod::Delete => Method::DELETE,
            ApiMethod::Write
            | ApiMethod::Copy
            | ApiMethod::Move
            | ApiMethod::Begin
            | ApiMethod::Prepare
            | ApiMethod::Commit
            | ApiMethod::Rollback
            | ApiMethod::Recover
            | ApiMethod::Login
            | ApiMethod::Logout => Method::POST,
        }
    }

    /// Declared parameter names, in call order
    pub fn params(&self) -> &'static [&'static str] {
        match self {
            ApiMethod::List => &["owner", "source", "recursively"],
            ApiMethod::Read => &["owner", "source", "offset", "limit"],
            ApiMethod::Write => &["owner", "source", "offset", "data", "md5Hash"],
            ApiMethod::Delete => OWNER_SOURCE,
            ApiMethod::Copy | ApiMethod::Move => TRANSFER,
            ApiMethod::Begin => &["transactionId"],
            ApiMethod::Login => &["userId", "password"],
            ApiMethod::Prepare
            | ApiMethod::Commit
            | ApiMethod::Rollback
            | ApiMethod::Recover
            | ApiMethod::Logout
            | ApiMethod::IsSessionValid => &[],
        }
    }

    /// Operation executed through the proxy chain; `None` for session methods
    pub fn operation_kind(&self) -> Option<OperationKind> {
        match self {
            ApiMethod::List => Some(OperationKind::List),
            ApiMethod::Read => Some(OperationKind::Read),
            ApiMethod::Write => Some(OperationKind::Write),
            ApiMethod::Delete => Some(OperationKind::Delete),
            ApiMethod::Copy => Some(OperationKind::Copy),
            ApiMethod::Move => Some(OperationKind::Move),
            ApiMethod::Begin => Some(OperationKind::Begin),
            ApiMethod::Prepare => Some(OperationKind::Prepare),
            ApiMethod::Commit => Some(OperationKind::Commit),
            ApiMethod::Rollback => Some(OperationKind::Rollback),
            ApiMethod::Recover => Some(OperationKind::Recover),
            ApiMethod::Login | ApiMethod::Logout | ApiMethod::IsSessionValid => None,
        }
    }

    /// Two-phase-commit control, reserved for interactive sessions
    pub fn is_transaction_control(&self) -> bool {
        self.operation_kind()
            .is_some_and(|kind| kind.is_transaction_control())
    }

    /// Ends an interactive session
    pub fn finishes_session(&self) -> bool {
        matches!(self, ApiMethod::Commit | ApiMethod::Rollback)
    }

    /// Served without checking out a worker
    pub fn is_session_method(&self) -> bool {
        self.operation_kind().is_none()
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_table() {
        assert_eq!(ApiMethod::List.http_method(), Method::GET);
        assert_eq!(ApiMethod::Read.http_method(), Method::GET);
        assert_eq!(ApiMethod::IsSessionValid.http_method(), Method::GET);
        assert_eq!(ApiMethod::Write.http_method(), Method::POST);
        assert_eq!(ApiMethod::Move.http_method(), Method::POST);
        assert_eq!(ApiMethod::Copy.http_method(), Method::POST);
        assert_eq!(ApiMethod::Login.http_method(), Method::POST);
        assert_eq!(ApiMethod::Logout.http_method(), Method::POST);
        assert_eq!(ApiMethod::Commit.http_method(), Method::POST);
        assert_eq!(ApiMethod::Delete.http_method(), Method::DELETE);
    }

    #[test]
    fn test_names_round_trip() {
        for method in ApiMethod::ALL {
            assert_eq!(ApiMethod::from_name(method.name()), Some(method));
        }
        assert_eq!(ApiMethod::from_name("dropEverything"), None);
        assert_eq!(ApiMethod::from_name("List"), None);
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(ParamType::of("recursively"), ParamType::Bool);
        assert_eq!(ParamType::of("offset"), ParamType::Long);
        assert_eq!(ParamType::of("limit"), ParamType::Int);
        assert_eq!(ParamType::of("transactionId"), ParamType::Uuid);
        assert_eq!(ParamType::of("owner"), ParamType::String);
    }

    #[test]
    fn test_transaction_control_flags() {
        assert!(ApiMethod::Begin.is_transaction_control());
        assert!(ApiMethod::Recover.is_transaction_control());
        assert!(!ApiMethod::Write.is_transaction_control());
        assert!(ApiMethod::Rollback.finishes_session());
        assert!(!ApiMethod::Prepare.finishes_session());
        assert!(ApiMethod::Login.is_session_method());
    }
}
