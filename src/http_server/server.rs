//! # HTTP Server
//!
//! Combines the API, download and observability routers behind one
//! listener.

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::api_routes::api_routes;
use super::config::HttpServerConfig;
use super::download_routes::download_routes;
use super::observability_routes::observability_routes;
use super::state::GatewayState;
use crate::observability::{log_event_with_fields, Event};

/// HTTP front end of the gateway
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: Arc<GatewayState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, state: Arc<GatewayState>) -> Router {
        let body_limit = config.body_limit(state.max_write_size_in_bytes);

        Router::new()
            .merge(observability_routes(Arc::clone(&state)))
            .nest("/api", api_routes(Arc::clone(&state)))
            .nest("/download", download_routes(state))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(config.cors_layer())
                    .layer(DefaultBodyLimit::max(body_limit)),
            )
    }

    /// Listen address
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.address()).await?;
        let local = listener.local_addr()?;
        log_event_with_fields(Event::Serving, &[("addr", &local.to_string())]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
