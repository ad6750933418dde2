//! packet-tunnel - OpenVPN tunnel host
//!
//! Loads a tunnel configuration, drives an OpenVPN engine through the
//! session coordinator and reports lifecycle changes on the terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tunnel_core::error::{ConfigError, TunnelError};
use tunnel_core::init_logging;

mod cli;

#[derive(Parser)]
#[command(name = "packet-tunnel")]
#[command(about = "Run an OpenVPN tunnel session from a TOML configuration")]
struct Cli {
    /// Configuration file (defaults to ~/.config/packet-tunnel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tunnel and keep it up until Ctrl-C
    Run,
    /// Validate the configuration and the OpenVPN installation
    Check,
    /// Attach the image referenced by a notification payload
    Notify {
        /// JSON file holding the notification content
        payload: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run => cli::run::run_tunnel(config).await,
        Commands::Check => cli::check::run_check(config),
        Commands::Notify { payload } => cli::notify::run_notify(&payload).await,
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Configuration problems exit with 2, everything else with 1
fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }

    match error.downcast_ref::<TunnelError>() {
        Some(TunnelError::Config(_)) => 2,
        _ => 1,
    }
}
