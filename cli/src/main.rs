// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # simfleet
//!
//! One binary for every role in a simulation fleet.
//!
//! ## Commands
//!
//! - `simfleet agent` - Run the per-host Agent daemon
//! - `simfleet controller` - Run the fleet Controller daemon
//! - `simfleet node list|get|probe|reconcile` - Inspect registered nodes
//! - `simfleet instance start|stop|list|get` - Operate simulation instances
//! - `simfleet config show|validate|generate` - Configuration management
//! - `simfleet db migrate` - Apply Controller database migrations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use simfleet_cli::commands::{self, ConfigCommand, DbCommand, InstanceCommand, NodeCommand};
use simfleet_cli::daemon;
use simfleet_core::domain::node_config::NodeConfigManifest;

/// simfleet - PX4 simulation fleet coordination
#[derive(Parser)]
#[command(name = "simfleet")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SIMFLEET_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "SIMFLEET_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format; defaults to the config value
    #[arg(long, global = true, env = "SIMFLEET_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    /// Controller base URL used by operator commands
    #[arg(
        long,
        global = true,
        env = "SIMFLEET_CONTROLLER_URL",
        default_value = "http://127.0.0.1:8000"
    )]
    controller_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Agent daemon on this host
    #[command(name = "agent")]
    Agent,

    /// Run the Controller daemon
    #[command(name = "controller")]
    Controller,

    /// Registered node operations
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Simulation instance operations
    #[command(name = "instance")]
    Instance {
        #[command(subcommand)]
        command: InstanceCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Controller database maintenance
    #[command(name = "db")]
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; a missing file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Agent) => {
            let config = load_daemon_config(&cli)?;
            daemon::agent::run(config).await
        }
        Some(Commands::Controller) => {
            let config = load_daemon_config(&cli)?;
            daemon::controller::run(config).await
        }
        Some(Commands::Node { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), cli.log_format.unwrap_or(LogFormat::Text))?;
            commands::node::handle_command(command, &cli.controller_url).await
        }
        Some(Commands::Instance { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), cli.log_format.unwrap_or(LogFormat::Text))?;
            commands::instance::handle_command(command, &cli.controller_url).await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), cli.log_format.unwrap_or(LogFormat::Text))?;
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Db { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), cli.log_format.unwrap_or(LogFormat::Text))?;
            commands::db::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Daemons take their log settings from the manifest unless the flags say
/// otherwise, so logging is installed after the config is loaded.
fn load_daemon_config(cli: &Cli) -> Result<NodeConfigManifest> {
    let config = NodeConfigManifest::load_or_default(cli.config.clone()).context("Failed to load configuration")?;

    let logging = config.logging();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    let format = cli.log_format.unwrap_or(if logging.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    init_logging(&level, format)?;

    if let Some(metrics) = config.metrics() {
        daemon::install_metrics_exporter(metrics.port)?;
    }

    Ok(config)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
