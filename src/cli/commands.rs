//! CLI command implementations
//!
//! `start` boots in a fixed order: configuration, logging, storage and
//! pool, in-doubt transaction report, reaper, HTTP listener. Shutdown runs
//! the reverse on Ctrl-C or SIGTERM.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::auth::crypto::hash_password;
use crate::config::{GatewayConfig, StorageConfig};
use crate::http_server::{GatewayState, HttpServer};
use crate::observability::{self, log_event, log_event_with_fields, Event};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Start { config } => start(&config),
        Command::HashPassword { password } => hash(&password),
    }
}

/// Write a fresh configuration file and create the local storage root
///
/// Refuses to overwrite an existing file.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = GatewayConfig::generate();
    config.write_new(config_path)?;

    if let StorageConfig::Local { root } = &config.storage {
        std::fs::create_dir_all(root).map_err(|e| {
            CliError::config_error(format!("Failed to create directory {:?}: {}", root, e))
        })?;
    }

    write_response(json!({
        "initialized": true,
        "config": config_path.display().to_string(),
    }))
}

/// Print the argon2 hash of `password`
pub fn hash(password: &str) -> CliResult<()> {
    let hash = hash_password(password)?;
    write_response(json!({ "password_hash": hash }))
}

/// Start the gateway and serve until interrupted
pub fn start(config_path: &Path) -> CliResult<()> {
    let config = GatewayConfig::load(config_path)?;
    observability::init(config.severity(), config.format());
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("path", &config_path.display().to_string())],
    );

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(serve(config))
}

async fn serve(config: GatewayConfig) -> CliResult<()> {
    log_event(Event::BootStart);

    let state = Arc::new(
        GatewayState::from_config(&config)
            .map_err(|e| CliError::boot_failed(format!("Storage unavailable: {}", e)))?,
    );
    report_in_doubt(&state).await?;
    state.server().start_reaper();

    let server = HttpServer::new(config.http.clone(), Arc::clone(&state));
    log_event(Event::BootComplete);

    let result = server.start(shutdown_signal()).await;

    log_event(Event::ShutdownStart);
    state.server().shutdown();
    log_event(Event::ShutdownComplete);

    result.map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
}

/// Log transactions left prepared or active by a previous run
///
/// They stay in the journal until a transaction manager resolves them.
async fn report_in_doubt(state: &GatewayState) -> CliResult<()> {
    let server = state.server();
    let mut worker = server
        .check_out()
        .await
        .map_err(|e| CliError::boot_failed(e.to_string()))?;

    let result = worker.context_mut().connection_mut().recover();
    let failed = result.is_err();
    server.check_in(failed, worker);

    let ids = result.map_err(|e| CliError::boot_failed(format!("Recovery scan failed: {}", e)))?;
    if !ids.is_empty() {
        let listed = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        log_event_with_fields(
            Event::TransactionRecover,
            &[("in_doubt", &ids.len().to_string()), ("transaction_ids", &listed)],
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
