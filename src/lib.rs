//! afsgate - multi-tenant file access gateway
//!
//! Every file and transaction request passes through a fixed proxy chain
//! (authorization, validation, logging) before reaching the backend
//! connection of a pooled worker.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod connection;
pub mod core;
pub mod http_server;
pub mod observability;
pub mod pool;
pub mod server;
