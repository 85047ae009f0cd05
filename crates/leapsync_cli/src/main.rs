//! LeapSync CLI
//!
//! Command-line tools for running and maintaining a LeapSync relay.
//!
//! # Commands
//!
//! - `relay` - Run the relay server
//! - `inspect` - Display snapshot statistics
//! - `reseed` - Wipe a running relay and seed the baseline data set
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use leapsync_relay::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LeapSync relay and maintenance tools.
#[derive(Parser)]
#[command(name = "leapsync")]
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
    /// Run the relay server until interrupted
    Relay {
        /// Address to bind
        #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
        host: IpAddr,

        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Snapshot file of the authoritative store
        #[arg(long, env = "LEAPSYNC_SNAPSHOT", default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,

        /// Maximum concurrent connections
        #[arg(long)]
        max_connections: Option<usize>,
    },

    /// Display snapshot statistics
    Inspect {
        /// Snapshot file to read
        snapshot: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Wipe a running relay and seed the baseline data set
    Reseed {
        /// Relay WebSocket URL
        #[arg(short, long, default_value = "ws://127.0.0.1:4001")]
        url: String,

        /// Seconds to wait for the relay at each step
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Relay {
            host,
            port,
            snapshot,
            max_connections,
        } => {
            commands::relay::run(host, port, snapshot, max_connections)?;
        }
        Commands::Inspect { snapshot, format } => {
            commands::inspect::run(&snapshot, &format)?;
        }
        Commands::Reseed { url, timeout } => {
            commands::reseed::run(&url, timeout)?;
        }
        Commands::Version => {
            println!("LeapSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LeapSync Protocol v{}", leapsync_protocol::VERSION);
        }
    }

    Ok(())
}
