//! Protocol adapter
//!
//! Turns a raw transport request (verb, query parameters, body) into an
//! `ApiRequest`, hands it to the `ApiServer` and renders the outcome as a
//! `WireResponse`. Method and parameter errors are answered here and never
//! reach the server.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::Method;
use futures_util::FutureExt;
use serde_json::{Map, Value};

use super::errors::{type_identity, ApiError, ApiResult};
use super::method::ApiMethod;
use super::request::{coerce_json, coerce_str, ApiRequest};
use super::response::WireResponse;
use crate::observability::Logger;
use crate::server::ApiServer;

/// Query parameters as the transport delivers them: every key with all of
/// its values, in arrival order
pub type UriParameters = Vec<(String, Vec<String>)>;

/// Group `key=value` pairs by key, keeping first-seen key order
pub fn group_parameters<I, K, V>(pairs: I) -> UriParameters
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut grouped: UriParameters = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (key, value) in pairs {
        let key = key.into();
        match index.get(&key) {
            Some(&i) => grouped[i].1.push(value.into()),
            None => {
                index.insert(key.clone(), grouped.len());
                grouped.push((key, vec![value.into()]));
            }
        }
    }
    grouped
}

fn resolve_method(http_method: &Method, name: &str) -> ApiResult<ApiMethod> {
    let method = ApiMethod::from_name(name).ok_or_else(|| ApiError::method_not_found(name))?;
    if method.http_method() != *http_method {
        return Err(ApiError::invalid_http_method(http_method, Some(name)));
    }
    Ok(method)
}

fn single<'a>(key: &str, values: &'a [String]) -> ApiResult<&'a str> {
    match values {
        [value] => Ok(value),
        _ => Err(ApiError::incorrect_parameters(format!(
            "Parameter '{}' must have exactly one value, got {}",
            key,
            values.len()
        ))
        .with_detail("parameter", key)),
    }
}

/// GET: everything, including the method, comes on the query string
fn parse_query(http_method: &Method, parameters: &UriParameters) -> ApiResult<ApiRequest> {
    let name = match parameters.iter().find(|(key, _)| key == "method") {
        Some((key, values)) => single(key, values)
            .map_err(|_| ApiError::invalid_http_method(http_method, None))?,
        None => return Err(ApiError::invalid_http_method(http_method, None)),
    };
    resolve_method(http_method, name)?;

    let mut request = ApiRequest::new(name);
    for (key, values) in parameters {
        let value = single(key, values)?;
        match key.as_str() {
            "method" => {}
            "sessionToken" => request.session_token = Some(value.to_string()),
            "interactiveSessionKey" => request.interactive_session_key = Some(value.to_string()),
            "transactionManagerKey" => request.transaction_manager_key = Some(value.to_string()),
            _ => {
                request.params.insert(key.clone(), coerce_str(key, value)?);
            }
        }
    }
    Ok(request)
}

fn text_field(key: &str, value: &Value) -> ApiResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ApiError::incorrect_parameters(format!("'{}' must be a string", key))),
    }
}

/// POST and DELETE: the method on the query string, everything else in a
/// JSON object body
fn parse_body(http_method: &Method, parameters: &UriParameters, body: &[u8]) -> ApiResult<ApiRequest> {
    let name = match parameters.iter().find(|(key, _)| key == "method") {
        Some((_, values)) if values.len() == 1 => values[0].as_str(),
        _ => return Err(ApiError::invalid_http_method(http_method, None)),
    };
    resolve_method(http_method, name)?;

    let fields: Map<String, Value> = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        serde_json::from_slice(body).map_err(|e| {
            ApiError::incorrect_parameters(format!("Request body is not a JSON object: {}", e))
                .with_detail("exceptionType", type_identity::<serde_json::Error>())
                .with_detail("exceptionMessage", e.to_string())
        })?
    };

    let mut request = ApiRequest::new(name);
    for (key, value) in fields {
        match key.as_str() {
            "sessionToken" => request.session_token = Some(text_field(&key, &value)?),
            "interactiveSessionKey" => {
                request.interactive_session_key = Some(text_field(&key, &value)?)
            }
            "transactionManagerKey" => {
                request.transaction_manager_key = Some(text_field(&key, &value)?)
            }
            _ => {
                let coerced = coerce_json(&key, &value)?;
                request.params.insert(key, coerced);
            }
        }
    }
    Ok(request)
}

/// Parse a transport request. Never touches the proxy chain.
pub fn parse_request(
    http_method: &Method,
    parameters: &UriParameters,
    body: &[u8],
) -> ApiResult<ApiRequest> {
    if *http_method == Method::GET {
        parse_query(http_method, parameters)
    } else if *http_method == Method::POST || *http_method == Method::DELETE {
        parse_body(http_method, parameters, body)
    } else {
        Err(ApiError::invalid_http_method(http_method, None))
    }
}

/// Transport-facing entry point
#[derive(Clone)]
pub struct ApiServerAdapter {
    server: Arc<ApiServer>,
}

impl ApiServerAdapter {
    pub fn new(server: Arc<ApiServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<ApiServer> {
        &self.server
    }

    /// Handle one request end to end. A panic below the adapter becomes an
    /// `Unknown` error response.
    pub async fn process(
        &self,
        http_method: &Method,
        parameters: &UriParameters,
        body: &[u8],
    ) -> WireResponse {
        let result = match parse_request(http_method, parameters, body) {
            Ok(request) => {
                let method = request.method.clone();
                let result = AssertUnwindSafe(self.server.process_operation(request))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        let err = ApiError::from_panic(&*payload);
                        Logger::error(
                            "API_REQUEST_PANICKED",
                            &[("method", method.as_str()), ("message", err.message())],
                        );
                        Err(err)
                    });
                if let Err(e) = &result {
                    Logger::debug(
                        "API_REQUEST_FAILED",
                        &[("method", method.as_str()), ("code", e.code()), ("message", e.message())],
                    );
                }
                result
            }
            Err(e) => {
                Logger::debug(
                    "API_REQUEST_REJECTED",
                    &[("http_method", http_method.as_str()), ("code", e.code())],
                );
                Err(e)
            }
        };
        WireResponse::from(result)
    }
}
