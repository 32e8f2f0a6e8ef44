// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Overwatch CLI
//!
//! The `overwatch` binary runs the kill switch daemon and talks to it.
//!
//! ## Commands
//!
//! - `overwatch serve` - Run the HTTP daemon (node store, kill switch, audit)
//! - `overwatch node list|create|show|suspend|dispatch` - Node operations
//! - `overwatch audit list` - Inspect the compliance trail
//! - `overwatch reconcile` - Re-drive suspensions that have no audit entry
//! - `overwatch config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use overwatch::commands::{self, AuditCommand, ConfigCommand, NodeCommand};
use overwatch::daemon::{self, ServeOverrides};
use overwatch_core::domain::overwatch_config::OverwatchConfigManifest;

/// Overwatch - operator kill switch for autonomous nodes
#[derive(Parser)]
#[command(name = "overwatch")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "OVERWATCH_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API port (default: from config, else 8000)
    #[arg(long, global = true, env = "OVERWATCH_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: from config, else 127.0.0.1)
    #[arg(long, global = true, env = "OVERWATCH_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "OVERWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true, env = "OVERWATCH_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kill switch daemon in the foreground
    #[command(name = "serve")]
    Serve,

    /// Node operations
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Kill switch audit trail
    #[command(name = "audit")]
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },

    /// Re-drive suspended nodes that have no audit entry
    #[command(name = "reconcile")]
    Reconcile,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Config is optional here; commands that need it load it themselves
    let config = OverwatchConfigManifest::load_or_default(cli.config.clone()).ok();
    let logging = config
        .as_ref()
        .and_then(|c| c.spec.observability.as_ref())
        .and_then(|o| o.logging.as_ref());
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| logging.map(|l| l.format.clone()))
        .unwrap_or_else(|| "text".to_string());
    init_logging(&level, &format)?;

    let host = cli
        .host
        .clone()
        .or_else(|| config.as_ref().map(|c| c.spec.network.bind_address.clone()))
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = cli
        .port
        .or_else(|| config.as_ref().map(|c| c.spec.network.port))
        .unwrap_or(8000);

    match cli.command {
        Some(Commands::Serve) => {
            info!("Starting Overwatch daemon");
            daemon::start_daemon(cli.config, ServeOverrides { host: cli.host, port: cli.port }).await
        }
        Some(Commands::Node { command }) => commands::node::handle_command(command, &host, port).await,
        Some(Commands::Audit { command }) => commands::audit::handle_command(command, &host, port).await,
        Some(Commands::Reconcile) => commands::reconcile::execute(&host, port).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            // Keeps the audit fallback records identifiable
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }

    Ok(())
}
