//! HDIO CLI
//!
//! Command-line driver for the HDML resolution and sync pipeline.
//!
//! # Commands
//!
//! - `resolve` - Run one offline pass over a markup file
//! - `run` - Drive a sync worker from JSON-lines messages on stdin

mod commands;

use clap::{Parser, Subcommand};
use hdio_sync_engine::Identity;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// HDML resolution and sync tools.
#[derive(Parser)]
#[command(name = "hdio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a markup file and show the mapping and batch
    Resolve {
        /// Markup file
        file: PathBuf,

        /// Write the packaged batch to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sync markup read as JSON-lines messages from stdin
    Run {
        /// Server base URL
        #[arg(long, env = "HDIO_HOST", default_value = "")]
        host: String,

        /// Tenant identifier
        #[arg(long, env = "HDIO_TENANT", default_value = "")]
        tenant: String,

        /// Tenant access token
        #[arg(long, env = "HDIO_TOKEN", default_value = "", hide_env_values = true)]
        token: String,

        /// Debounce window in milliseconds
        #[arg(long, default_value = "5")]
        debounce_ms: u64,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            file,
            output,
            format,
        } => {
            commands::resolve::run(&file, output.as_deref(), &format)?;
        }
        Commands::Run {
            host,
            tenant,
            token,
            debounce_ms,
            timeout_secs,
        } => {
            commands::run::run(commands::run::RunOptions {
                identity: Identity::new(host, tenant, token),
                debounce: Duration::from_millis(debounce_ms),
                timeout: Duration::from_secs(timeout_secs),
            })?;
        }
        Commands::Version => {
            println!("HDIO CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("HDIO bundle format v{}", hdio_protocol::BUNDLE_VERSION);
        }
    }

    Ok(())
}
