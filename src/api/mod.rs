//! Wire protocol
//!
//! - `ApiMethod`: method names, transport verbs and parameter lists
//! - `ApiRequest`/`ParamValue`: typed request envelope
//! - `ApiResponse`/`WireResponse`: result or error, JSON or raw bytes
//! - `ApiError`: the error taxonomy callers see
//! - `ApiServerAdapter`: transport request in, wire response out

mod adapter;
mod dispatch;
mod errors;
mod method;
mod request;
mod response;

pub use adapter::{group_parameters, parse_request, ApiServerAdapter, UriParameters};
pub use dispatch::{dispatch, to_operation};
pub use errors::{panic_message, type_identity, ApiError, ApiErrorKind, ApiResult};
pub use method::{ApiMethod, ParamType};
pub use request::{coerce_json, coerce_str, ApiRequest, ParamValue, PROTOCOL_VERSION};
pub use response::{
    ApiResponse, ApiValue, WireResponse, CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON,
};
