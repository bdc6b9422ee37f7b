//! API error taxonomy
//!
//! The only error type that crosses the wire. Chain errors keep their
//! kind and details; everything else becomes `InternalError` or `Unknown`
//! together with the identity and message of the failing error.

use std::any::Any;
use std::fmt;

use axum::http::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::auth::AuthError;
use crate::connection::ConnectionError;
use crate::core::CoreError;
use crate::pool::PoolError;

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Error kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApiErrorKind {
    AclDenied,
    ReadSizeExceeded,
    WriteSizeExceeded,
    InvalidPath,
    InvalidRange,
    AuthenticationFailed,
    InvalidHttpMethod,
    IncorrectParameters,
    MethodNotFound,
    InternalError,
    Unknown,
}

impl ApiErrorKind {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ApiErrorKind::AclDenied => "ACL_DENIED",
            ApiErrorKind::ReadSizeExceeded => "READ_SIZE_EXCEEDED",
            ApiErrorKind::WriteSizeExceeded => "WRITE_SIZE_EXCEEDED",
            ApiErrorKind::InvalidPath => "INVALID_PATH",
            ApiErrorKind::InvalidRange => "INVALID_RANGE",
            ApiErrorKind::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ApiErrorKind::InvalidHttpMethod => "INVALID_HTTP_METHOD",
            ApiErrorKind::IncorrectParameters => "INCORRECT_PARAMETERS",
            ApiErrorKind::MethodNotFound => "METHOD_NOT_FOUND",
            ApiErrorKind::InternalError => "INTERNAL_ERROR",
            ApiErrorKind::Unknown => "UNKNOWN",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiErrorKind::AclDenied => 403,
            ApiErrorKind::ReadSizeExceeded | ApiErrorKind::WriteSizeExceeded => 413,
            ApiErrorKind::InvalidPath
            | ApiErrorKind::InvalidRange
            | ApiErrorKind::IncorrectParameters => 400,
            ApiErrorKind::AuthenticationFailed => 401,
            ApiErrorKind::InvalidHttpMethod => 405,
            ApiErrorKind::MethodNotFound => 404,
            ApiErrorKind::InternalError | ApiErrorKind::Unknown => 500,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Short type name of `T`, e.g. `ConnectionError`
pub fn type_identity<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Text of a panic payload, for the two payload types `panic!` produces
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Structured wire error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    kind: ApiErrorKind,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    details: Map<String, Value>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a detail field
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    fn with_cause(self, exception_type: &str, message: &str) -> Self {
        self.with_detail("exceptionType", exception_type)
            .with_detail("exceptionMessage", message)
    }

    /// Transport verb does not match the method, or no method was given
    pub fn invalid_http_method(given: &Method, method: Option<&str>) -> Self {
        let err = Self::new(
            ApiErrorKind::InvalidHttpMethod,
            match method {
                Some(name) => format!("Method '{}' cannot be called with HTTP {}", name, given),
                None => format!("HTTP {} request without a valid 'method' parameter", given),
            },
        )
        .with_detail("httpMethod", given.as_str());
        match method {
            Some(name) => err.with_detail("method", name),
            None => err,
        }
    }

    pub fn incorrect_parameters(reason: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::IncorrectParameters, reason)
    }

    /// A parameter value could not be coerced to its declared type
    pub fn coercion(key: &str, exception_type: &str, message: &str) -> Self {
        Self::incorrect_parameters(format!("Parameter '{}' could not be parsed: {}", key, message))
            .with_detail("parameter", key)
            .with_cause(exception_type, message)
    }

    pub fn method_not_found(name: &str) -> Self {
        Self::new(
            ApiErrorKind::MethodNotFound,
            format!("Method '{}' not found", name),
        )
        .with_detail("method", name)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InternalError, message)
    }

    pub fn shutting_down() -> Self {
        Self::internal("Server is shutting down")
    }

    /// Interactive session already has a request in flight
    pub fn session_busy() -> Self {
        Self::internal("Session already has a request in progress")
            .with_detail("reason", "SessionBusy")
    }

    /// Anything not otherwise classified
    pub fn unknown<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::unclassified(type_identity::<E>(), &err.to_string())
    }

    /// A collaborator panicked while the request was being served
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::unclassified("panic", &panic_message(payload))
    }

    fn unclassified(exception_type: &str, message: &str) -> Self {
        Self::new(ApiErrorKind::Unknown, format!("Unknown error: {}", message))
            .with_cause(exception_type, message)
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::AclDenied {
                session_token,
                permissions,
                owner,
                path,
                operation,
            } => ApiError::new(ApiErrorKind::AclDenied, message)
                .with_detail("sessionToken", json!(session_token))
                .with_detail("permissions", json!(permissions))
                .with_detail("owner", owner)
                .with_detail("path", path)
                .with_detail("operation", operation.to_string()),
            CoreError::ReadSizeExceeded {
                session_token,
                owner,
                path,
                limit,
                max,
            } => ApiError::new(ApiErrorKind::ReadSizeExceeded, message)
                .with_detail("sessionToken", json!(session_token))
                .with_detail("owner", owner)
                .with_detail("path", path)
                .with_detail("limit", limit)
                .with_detail("max", max),
            CoreError::WriteSizeExceeded { length, max } => {
                ApiError::new(ApiErrorKind::WriteSizeExceeded, message)
                    .with_detail("length", length)
                    .with_detail("max", max)
            }
            CoreError::InvalidRange { parameter, value } => {
                ApiError::new(ApiErrorKind::InvalidRange, message)
                    .with_detail("parameter", parameter)
                    .with_detail("value", value)
            }
            CoreError::InvalidPath {
                owner,
                path,
                reason,
            } => ApiError::new(ApiErrorKind::InvalidPath, message)
                .with_detail("owner", owner)
                .with_detail("path", path)
                .with_detail("reason", reason),
            CoreError::Connection(inner) => ApiError::internal(message)
                .with_cause(type_identity::<ConnectionError>(), &inner.to_string()),
            CoreError::Internal(_) => {
                ApiError::internal(message.clone()).with_cause(type_identity::<CoreError>(), &message)
            }
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        let message = err.to_string();
        ApiError::internal(message.clone()).with_cause(type_identity::<PoolError>(), &message)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        if err.is_client_error() {
            ApiError::new(ApiErrorKind::AuthenticationFailed, message)
        } else {
            ApiError::internal(message.clone()).with_cause(type_identity::<AuthError>(), &message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OperationKind, Permissions};

    #[test]
    fn test_acl_denied_keeps_details() {
        let err: ApiError = CoreError::AclDenied {
            session_token: Some("tok".into()),
            permissions: Permissions::READ,
            owner: "bob".into(),
            path: "/".into(),
            operation: OperationKind::List,
        }
        .into();

        assert_eq!(err.kind(), ApiErrorKind::AclDenied);
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.detail("owner"), Some(&json!("bob")));
        assert_eq!(err.detail("operation"), Some(&json!("List")));
        assert_eq!(err.detail("permissions"), Some(&json!(["Read"])));
    }

    #[test]
    fn test_read_size_exceeded_details() {
        let err: ApiError = CoreError::ReadSizeExceeded {
            session_token: None,
            owner: "alice".into(),
            path: "/big".into(),
            limit: 10_000_000,
            max: 1_000_000,
        }
        .into();

        assert_eq!(err.kind(), ApiErrorKind::ReadSizeExceeded);
        assert_eq!(err.detail("limit"), Some(&json!(10_000_000)));
        assert_eq!(err.detail("max"), Some(&json!(1_000_000)));
    }

    #[test]
    fn test_backend_failure_is_internal_with_identity() {
        let err: ApiError = CoreError::from(ConnectionError::NotFound("/alice/x".into())).into();

        assert_eq!(err.kind(), ApiErrorKind::InternalError);
        assert_eq!(err.detail("exceptionType"), Some(&json!("ConnectionError")));
    }

    #[test]
    fn test_coercion_error_names_parameter() {
        let err = ApiError::coercion("offset", "ParseIntError", "invalid digit found in string");
        assert_eq!(err.kind(), ApiErrorKind::IncorrectParameters);
        assert_eq!(err.detail("parameter"), Some(&json!("offset")));
        assert_eq!(err.detail("exceptionType"), Some(&json!("ParseIntError")));
    }

    #[test]
    fn test_serialized_shape() {
        let err = ApiError::method_not_found("explode");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], json!("MethodNotFound"));
        assert_eq!(value["code"], json!("METHOD_NOT_FOUND"));
        assert_eq!(value["details"]["method"], json!("explode"));
    }

    #[test]
    fn test_acl_denied_token_only_in_details() {
        let err: ApiError = CoreError::AclDenied {
            session_token: Some("secret-token".into()),
            permissions: Permissions::WRITE,
            owner: "bob".into(),
            path: "/x".into(),
            operation: OperationKind::Write,
        }
        .into();

        assert!(!err.message().contains("secret-token"));
        assert_eq!(err.detail("sessionToken"), Some(&json!("secret-token")));
    }

    #[test]
    fn test_core_internal_keeps_message_as_cause() {
        let err: ApiError = CoreError::internal("chain misconfigured").into();

        assert_eq!(err.kind(), ApiErrorKind::InternalError);
        assert_eq!(err.detail("exceptionType"), Some(&json!("CoreError")));
        assert_eq!(
            err.detail("exceptionMessage"),
            Some(&json!("Internal error: chain misconfigured"))
        );
    }

    #[test]
    fn test_unknown_carries_identity() {
        let err = ApiError::unknown(&std::fmt::Error);
        assert_eq!(err.kind(), ApiErrorKind::Unknown);
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.detail("exceptionType"), Some(&json!("Error")));
    }

    #[test]
    fn test_panic_payloads() {
        let err = ApiError::from_panic(&"backend exploded");
        assert_eq!(err.kind(), ApiErrorKind::Unknown);
        assert_eq!(err.detail("exceptionType"), Some(&json!("panic")));
        assert_eq!(err.detail("exceptionMessage"), Some(&json!("backend exploded")));

        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }

    #[test]
    fn test_type_identity_is_short() {
        assert_eq!(type_identity::<std::num::ParseIntError>(), "ParseIntError");
    }
}
