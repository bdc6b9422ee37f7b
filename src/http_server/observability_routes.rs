//! Observability HTTP Routes
//!
//! Health check and counters.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use super::state::GatewayState;
use crate::pool::PoolStatsSnapshot;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create observability routes
pub fn observability_routes(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check handler; 503 once shutdown has begun
async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let (status, label) = if state.server().is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    } else {
        (StatusCode::OK, "ok")
    };
    let response = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status, Json(response))
}

/// Metrics handler - operation counters plus pool statistics
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(metrics_body(state.metrics.to_json(), state.server().pool().stats())),
    )
}

fn metrics_body(operations: Value, pool: PoolStatsSnapshot) -> Value {
    json!({
        "operations": operations,
        "pool": pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ok"));
    }

    #[test]
    fn test_metrics_body_shape() {
        let registry = MetricsRegistry::new();
        registry.increment_archives_streamed();
        let pool = PoolStatsSnapshot {
            checkouts: 2,
            checkins: 1,
            discarded: 0,
            created: 1,
            in_use: 1,
            idle: 0,
        };

        let body = metrics_body(registry.to_json(), pool);
        assert_eq!(body["pool"]["in_use"], 1);
        assert!(body["operations"].is_object());
    }
}
