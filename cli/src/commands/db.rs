// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Commands
//!
//! `simfleet db migrate` applies the Controller's embedded migrations to the
//! configured PostgreSQL database. The Controller also migrates on startup;
//! this command exists for deployments that run schema changes as a
//! separate step.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! simfleet db migrate
//!
//! # Preview migrations without applying
//! simfleet db migrate --dry-run
//! ```
//!
//! The connection string comes from `spec.controller.storage.database_url`
//! or `SIMFLEET_DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use simfleet_core::domain::node_config::NodeConfigManifest;
use simfleet_core::domain::repository::StorageBackend;
use simfleet_core::infrastructure::db::{Database, MIGRATOR};

#[derive(Subcommand)]
pub enum DbCommand {
    /// Apply pending schema migrations
    Migrate {
        /// List pending migrations without applying them
        #[arg(long)]
        dry_run: bool,
    },
}

pub async fn handle_command(command: DbCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        DbCommand::Migrate { dry_run } => migrate(config_override, dry_run).await,
    }
}

async fn migrate(config_override: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override).context("Failed to load configuration")?;
    let backend = config
        .spec
        .controller
        .storage
        .to_backend()
        .context("Invalid storage configuration")?;
    let StorageBackend::PostgreSQL(pg) = backend else {
        anyhow::bail!("Controller storage is in-memory; set spec.controller.storage or SIMFLEET_DATABASE_URL");
    };

    println!("Connecting to database...");
    let db = Database::new(&pg.connection_string).await?;

    // A fresh database has no bookkeeping table yet
    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success")
        .fetch_all(db.get_pool())
        .await
        .unwrap_or_default();

    let pending: Vec<_> = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration() && !applied.contains(&m.version))
        .collect();
    let total = MIGRATOR.iter().filter(|m| !m.migration_type.is_down_migration()).count();

    println!("Migration status: {} applied, {} total available.", total - pending.len(), total);

    if pending.is_empty() {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in &pending {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    db.migrate().await?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
