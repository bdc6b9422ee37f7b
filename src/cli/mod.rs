//! CLI module for afsgate
//!
//! Provides command-line interface for:
//! - init: Write a configuration file with generated keys
//! - start: Boot the gateway and serve HTTP
//! - hash-password: Produce a password hash for the user table

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{hash, init, run, run_command, start};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_response, write_response_to};
