//! CLI argument definitions using clap
//!
//! Commands:
//! - afsgate init --config <path>
//! - afsgate start --config <path>
//! - afsgate hash-password <password>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// afsgate - multi-tenant file access gateway
#[derive(Parser, Debug)]
#[command(name = "afsgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a configuration file with fresh access keys
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./afsgate.json")]
        config: PathBuf,
    },

    /// Start the gateway
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./afsgate.json")]
        config: PathBuf,
    },

    /// Print an argon2 hash for a user entry in the configuration
    HashPassword {
        password: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
