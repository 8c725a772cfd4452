// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use simfleet_core::domain::node_config::{NodeConfigManifest, StorageBackendKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./simfleet-config.yaml)
        #[arg(short, long, default_value = "./simfleet-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(output, examples, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SIMFLEET_CONFIG_PATH: {}",
            std::env::var("SIMFLEET_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./simfleet-config.yaml");
        println!("  4. ~/.simfleet/config.yaml");
        println!("  5. /etc/simfleet/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    print!("{}", summary(&config));
    Ok(())
}

/// Human-readable overview of the parts operators usually need. Credentials
/// are never printed.
pub fn summary(config: &NodeConfigManifest) -> String {
    let spec = &config.spec;
    let mut out = String::new();

    out.push_str(&format!("{}\n\n", "Current configuration:".bold()));

    out.push_str(&format!("{}\n", "Node Identity:".bold()));
    out.push_str(&format!("  ID: {}\n", spec.node.id));
    out.push_str(&format!("  Name: {}\n", config.metadata.name));
    if !spec.node.tags.is_empty() {
        out.push_str(&format!("  Tags: {}\n", spec.node.tags.join(", ")));
    }
    match spec.node.resources {
        Some(r) => out.push_str(&format!(
            "  Resources: {} cores, {} GB memory, {} GB disk (declared)\n",
            r.cpu_cores, r.memory_gb, r.disk_gb
        )),
        None => out.push_str("  Resources: probed from host\n"),
    }
    out.push('\n');

    let agent = &spec.agent;
    out.push_str(&format!("{}\n", "Agent:".bold()));
    out.push_str(&format!("  Listen: {}:{}\n", agent.bind_address, agent.port));
    out.push_str(&format!("  Advertised address: {}\n", config.agent_public_address()));
    out.push_str(&format!("  Controller: {}\n", agent.controller_url));
    out.push_str(&format!(
        "  Port range: {}-{}\n",
        agent.port_range.start, agent.port_range.end
    ));
    out.push_str(&format!("  Heartbeat: every {}s\n", agent.heartbeat_interval_seconds));
    out.push_str(&format!(
        "  Launcher: {} (network {}, autopull {})\n",
        agent.launcher.image, agent.launcher.network_mode, agent.launcher.autopull
    ));
    out.push('\n');

    let controller = &spec.controller;
    out.push_str(&format!("{}\n", "Controller:".bold()));
    out.push_str(&format!("  Listen: {}:{}\n", controller.bind_address, controller.port));
    out.push_str(&format!(
        "  Agent RPC: {}://<node>:{} (timeout {}s, health {}s)\n",
        controller.agent_scheme,
        controller.default_agent_port,
        controller.agent_timeout_seconds,
        controller.health_timeout_seconds
    ));
    out.push_str(&format!(
        "  Node freshness: {}s (sweep every {}s)\n",
        controller.node_freshness_seconds, controller.stale_sweep_interval_seconds
    ));
    let storage = match controller.storage.backend {
        StorageBackendKind::InMemory => "in-memory",
        StorageBackendKind::Postgres => "postgres",
    };
    out.push_str(&format!("  Storage: {}\n", storage));
    out.push('\n');

    let logging = config.logging();
    out.push_str(&format!("{}\n", "Observability:".bold()));
    out.push_str(&format!("  Logging: {} ({})\n", logging.level, logging.format));
    match config.metrics() {
        Some(m) => out.push_str(&format!("  Metrics: enabled on port {}\n", m.port)),
        None => out.push_str("  Metrics: disabled\n"),
    }

    out
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

async fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", output.display());
    }

    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
