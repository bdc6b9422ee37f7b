//! # HTTP Server Module
//!
//! Axum front end of the gateway.
//!
//! # Endpoints
//!
//! - `/api` - Every API method, dispatched by the `method` query parameter
//! - `/download` - Zip archive of one or more owner/source pairs
//! - `/health` - Health check
//! - `/metrics` - Operation counters and pool statistics

pub mod api_routes;
pub mod config;
pub mod download_routes;
pub mod observability_routes;
pub mod server;
pub mod state;

pub use config::HttpServerConfig;
pub use download_routes::{DownloadRequest, CONTENT_TYPE_ZIP};
pub use server::HttpServer;
pub use state::GatewayState;
