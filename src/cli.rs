//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Price monitor API host with mutual-TLS client authentication
#[derive(Parser, Debug)]
#[command(name = "price-monitor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PRICE_MONITOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PRICE_MONITOR_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "PRICE_MONITOR_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "PRICE_MONITOR_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PRICE_MONITOR_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Print a certificate's subject, issuer, validity and fingerprint
    Inspect {
        /// PEM certificate file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Validate a client certificate against the configured CA
    Verify {
        /// PEM certificate file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Load the configured certificate bundle and summarise it
    Bundle,
}
