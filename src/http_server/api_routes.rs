//! API HTTP Routes
//!
//! Single `/api` endpoint. The HTTP verb, query string and body are handed
//! to the protocol adapter unchanged; its wire response is rendered as is.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};

use super::state::GatewayState;
use crate::api::{group_parameters, WireResponse};

/// Create API routes
pub fn api_routes(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", any(api_handler))
        .with_state(state)
}

async fn api_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let parameters = group_parameters(query);
    let wire = state.adapter.process(&method, &parameters, &body).await;
    render(wire)
}

/// Turn an adapter response into an HTTP response
pub(crate) fn render(wire: WireResponse) -> Response {
    let status = StatusCode::from_u16(wire.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, wire.content_type)],
        Body::from(wire.body),
    )
        .into_response()
}
