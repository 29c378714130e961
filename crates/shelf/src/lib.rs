//! shelf - command-line front end for the game session tracker
//!
//! This crate wires the pieces together for the `shelf` binary:
//! - `config` - `AppConfig` loaded from TOML with environment overrides
//! - `cli` - clap subcommands and their execution
//! - `bridge` - drains session events into UI effects
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Errors surface through `anyhow` with context

pub mod bridge;
pub mod cli;
pub mod config;

pub use bridge::{run_bridge, ConsoleNotifier, Notifier};
pub use cli::{Cli, Command};
pub use config::AppConfig;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "shelf=info,shelf_app=info,shelf_core=info,shelf_tracker=info";

/// Initializes logging to stderr. `RUST_LOG` overrides the default filter.
pub fn init_tracing() -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(DEFAULT_LOG_FILTER)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Entry point of the `shelf` binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let config = AppConfig::load()
        .context("Failed to load configuration")?
        .with_data_dir_override(cli.data_dir.clone());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "shelf starting"
    );

    execute(cli.command, config)
}

#[tokio::main]
async fn execute(command: Command, config: AppConfig) -> Result<()> {
    cli::execute(command, config).await
}
