//! API request types
//!
//! Transport-neutral request envelope and the coercion of raw wire values
//! into the declared parameter types.

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;
use uuid::Uuid;

use super::errors::{type_identity, ApiError, ApiResult};
use super::method::{ApiMethod, ParamType};

/// Protocol version stamped on every request and response
pub const PROTOCOL_VERSION: &str = "1";

/// Typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Long(i64),
    Int(i32),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    String(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => ParamType::Bool.name(),
            ParamValue::Long(_) => ParamType::Long.name(),
            ParamValue::Int(_) => ParamType::Int.name(),
            ParamValue::Uuid(_) => ParamType::Uuid.name(),
            ParamValue::Bytes(_) => ParamType::Bytes.name(),
            ParamValue::String(_) => ParamType::String.name(),
        }
    }

    fn matches(&self, declared: ParamType) -> bool {
        matches!(
            (self, declared),
            (ParamValue::Bool(_), ParamType::Bool)
                | (ParamValue::Long(_), ParamType::Long)
                | (ParamValue::Int(_), ParamType::Int)
                | (ParamValue::Uuid(_), ParamType::Uuid)
                | (ParamValue::Bytes(_), ParamType::Bytes)
                | (ParamValue::String(_), ParamType::String)
        )
    }
}

fn coercion_error<E: std::error::Error>(key: &str, err: E) -> ApiError {
    ApiError::coercion(key, type_identity::<E>(), &err.to_string())
}

fn decode_base64(key: &str, raw: &str) -> ApiResult<Vec<u8>> {
    // Clients send either alphabet, padded or not
    URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| URL_SAFE.decode(raw))
        .or_else(|_| STANDARD.decode(raw))
        .map_err(|e| coercion_error(key, e))
}

/// Coerce a query-string value to the type declared for `key`
pub fn coerce_str(key: &str, raw: &str) -> ApiResult<ParamValue> {
    match ParamType::of(key) {
        ParamType::Bool => raw
            .to_ascii_lowercase()
            .parse::<bool>()
            .map(ParamValue::Bool)
            .map_err(|e| coercion_error(key, e)),
        ParamType::Long => raw
            .parse::<i64>()
            .map(ParamValue::Long)
            .map_err(|e| coercion_error(key, e)),
        ParamType::Int => raw
            .parse::<i32>()
            .map(ParamValue::Int)
            .map_err(|e| coercion_error(key, e)),
        ParamType::Uuid => Uuid::parse_str(raw)
            .map(ParamValue::Uuid)
            .map_err(|e| coercion_error(key, e)),
        ParamType::Bytes => decode_base64(key, raw).map(ParamValue::Bytes),
        ParamType::String => Ok(ParamValue::String(raw.to_string())),
    }
}

/// Coerce a JSON body value to the type declared for `key`
///
/// Numbers and booleans may also arrive as strings.
pub fn coerce_json(key: &str, value: &Value) -> ApiResult<ParamValue> {
    let declared = ParamType::of(key);
    match (declared, value) {
        (_, Value::String(raw)) => coerce_str(key, raw),
        (ParamType::Bool, Value::Bool(b)) => Ok(ParamValue::Bool(*b)),
        (ParamType::Long, Value::Number(n)) => n
            .as_i64()
            .map(ParamValue::Long)
            .ok_or_else(|| ApiError::coercion(key, "Number", &format!("{} is not a Long", n))),
        (ParamType::Int, Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(ParamValue::Int)
            .ok_or_else(|| ApiError::coercion(key, "Number", &format!("{} is not an Integer", n))),
        (_, other) => Err(ApiError::incorrect_parameters(format!(
            "Parameter '{}' must be {}",
            key,
            declared.name()
        ))
        .with_detail("parameter", key)
        .with_detail("received", other.clone())),
    }
}

/// Parsed request, ready for the server
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub version: String,
    pub method: String,
    pub params: BTreeMap<String, ParamValue>,
    pub session_token: Option<String>,
    pub interactive_session_key: Option<String>,
    pub transaction_manager_key: Option<String>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            method: method.into(),
            params: BTreeMap::new(),
            session_token: None,
            interactive_session_key: None,
            transaction_manager_key: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: ParamValue) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_interactive_session_key(mut self, key: impl Into<String>) -> Self {
        self.interactive_session_key = Some(key.into());
        self
    }

    pub fn with_transaction_manager_key(mut self, key: impl Into<String>) -> Self {
        self.transaction_manager_key = Some(key.into());
        self
    }

    /// Resolve the method name against the method table
    pub fn api_method(&self) -> ApiResult<ApiMethod> {
        ApiMethod::from_name(&self.method).ok_or_else(|| ApiError::method_not_found(&self.method))
    }

    /// Check count, presence and type of every declared parameter
    pub fn check_parameters(&self, method: ApiMethod) -> ApiResult<()> {
        let declared = method.params();
        if declared.len() != self.params.len() {
            return Err(ApiError::incorrect_parameters("Wrong parameter list length")
                .with_detail("method", method.name())
                .with_detail("expected", declared.len())
                .with_detail("received", self.params.len()));
        }
        for name in declared {
            let value = self.params.get(*name).ok_or_else(|| {
                ApiError::incorrect_parameters(format!(
                    "Missing parameter '{}' for method '{}'",
                    name, method
                ))
                .with_detail("parameter", *name)
            })?;
            let expected = ParamType::of(name);
            if !value.matches(expected) {
                return Err(ApiError::incorrect_parameters(format!(
                    "Parameter '{}' of method '{}' must be {}, got {}",
                    name,
                    method,
                    expected.name(),
                    value.type_name()
                ))
                .with_detail("parameter", *name));
            }
        }
        Ok(())
    }

    fn param(&self, key: &str) -> ApiResult<&ParamValue> {
        self.params
            .get(key)
            .ok_or_else(|| ApiError::incorrect_parameters(format!("Missing parameter '{}'", key)))
    }

    fn wrong_type(key: &str, expected: ParamType) -> ApiError {
        ApiError::incorrect_parameters(format!("Parameter '{}' must be {}", key, expected.name()))
    }

    pub fn string(&self, key: &str) -> ApiResult<&str> {
        match self.param(key)? {
            ParamValue::String(s) => Ok(s),
            _ => Err(Self::wrong_type(key, ParamType::String)),
        }
    }

    pub fn bool(&self, key: &str) -> ApiResult<bool> {
        match self.param(key)? {
            ParamValue::Bool(b) => Ok(*b),
            _ => Err(Self::wrong_type(key, ParamType::Bool)),
        }
    }

    pub fn long(&self, key: &str) -> ApiResult<i64> {
        match self.param(key)? {
            ParamValue::Long(v) => Ok(*v),
            _ => Err(Self::wrong_type(key, ParamType::Long)),
        }
    }

    pub fn int(&self, key: &str) -> ApiResult<i32> {
        match self.param(key)? {
            ParamValue::Int(v) => Ok(*v),
            _ => Err(Self::wrong_type(key, ParamType::Int)),
        }
    }

    pub fn uuid(&self, key: &str) -> ApiResult<Uuid> {
        match self.param(key)? {
            ParamValue::Uuid(v) => Ok(*v),
            _ => Err(Self::wrong_type(key, ParamType::Uuid)),
        }
    }

    pub fn bytes(&self, key: &str) -> ApiResult<&[u8]> {
        match self.param(key)? {
            ParamValue::Bytes(v) => Ok(v),
            _ => Err(Self::wrong_type(key, ParamType::Bytes)),
        }
    }
}
