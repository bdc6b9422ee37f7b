//! API response types
//!
//! JSON envelope for structured results and errors; raw bytes for binary
//! results.

use serde::Serialize;
use serde_json::Value;

use super::errors::{ApiError, ApiResult};
use super::request::PROTOCOL_VERSION;
use crate::core::OperationOutput;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Result payload of a successful call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiValue {
    Json(Value),
    Binary(Vec<u8>),
}

impl From<OperationOutput> for ApiValue {
    fn from(output: OperationOutput) -> Self {
        match output {
            OperationOutput::Bytes(bytes) => ApiValue::Binary(bytes),
            other => ApiValue::Json(other.to_json()),
        }
    }
}

/// Wire envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub version: String,
    pub result: Option<Value>,
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn success(result: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(error: ApiError) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Transport-ready response
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub error: bool,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl WireResponse {
    fn json(status: u16, error: bool, response: &ApiResponse) -> Self {
        let body = match serde_json::to_vec(response) {
            Ok(body) => body,
            Err(e) => format!(
                r#"{{"version":"{}","result":null,"error":{{"kind":"Unknown","code":"UNKNOWN","message":{}}}}}"#,
                PROTOCOL_VERSION,
                Value::String(e.to_string())
            )
            .into_bytes(),
        };
        Self {
            status,
            error,
            content_type: CONTENT_TYPE_JSON,
            body,
        }
    }

    /// Parse the JSON body back, mostly for tests and clients
    pub fn json_body(&self) -> Option<Value> {
        if self.content_type == CONTENT_TYPE_JSON {
            serde_json::from_slice(&self.body).ok()
        } else {
            None
        }
    }
}

impl From<ApiResult<ApiValue>> for WireResponse {
    fn from(result: ApiResult<ApiValue>) -> Self {
        match result {
            Ok(ApiValue::Binary(body)) => WireResponse {
                status: 200,
                error: false,
                content_type: CONTENT_TYPE_BINARY,
                body,
            },
            Ok(ApiValue::Json(value)) => Self::json(200, false, &ApiResponse::success(value)),
            Err(error) => {
                let status = error.status_code();
                Self::json(status, true, &ApiResponse::error(error))
            }
        }
    }
}
