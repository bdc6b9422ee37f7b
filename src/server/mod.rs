//! Request lifecycle
//!
//! `ApiServer` owns the proxy chain, the worker pool and the interactive
//! session table.

mod api_server;

pub use api_server::{ApiServer, ApiServerConfig};
