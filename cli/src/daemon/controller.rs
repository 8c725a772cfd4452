// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Controller daemon: node registry, fleet instance registry and the HTTP
//! API operators and Agents talk to.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use simfleet_core::application::repository_factory::{create_instance_repository, create_node_repository};
use simfleet_core::application::{ControllerService, NodeRegistry, SharedSecretVerifier, StandardControllerService};
use simfleet_core::domain::node_config::{resolve_secret, NodeConfigManifest};
use simfleet_core::domain::repository::StorageBackend;
use simfleet_core::infrastructure::db::Database;
use simfleet_core::infrastructure::HttpAgentClient;
use simfleet_core::presentation::controller_router;

pub async fn run(config: NodeConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let settings = &config.spec.controller;

    info!("simfleet controller starting");

    let backend = settings.storage.to_backend().context("Invalid storage configuration")?;
    let pool = match &backend {
        StorageBackend::InMemory => {
            warn!("Using in-memory storage; registry contents are lost on restart");
            None
        }
        StorageBackend::PostgreSQL(pg) => {
            let db = Database::new(&pg.connection_string).await?;
            db.migrate().await?;
            info!("Connected to PostgreSQL storage");
            Some(db.get_pool().clone())
        }
    };

    let node_repo = create_node_repository(&backend, pool.clone()).context("Failed to create node repository")?;
    let instance_repo =
        create_instance_repository(&backend, pool).context("Failed to create instance repository")?;

    let credential = resolve_secret(&settings.credential).context("Failed to resolve controller credential")?;
    let registry = Arc::new(NodeRegistry::new(
        node_repo,
        Arc::new(SharedSecretVerifier::new(credential)),
        settings.freshness_window(),
    ));

    let rpc = Arc::new(HttpAgentClient::from_config(settings));
    let service: Arc<dyn ControllerService> = Arc::new(StandardControllerService::new(registry, instance_repo, rpc));

    let sweeper = spawn_stale_sweep(service.clone(), settings.stale_sweep_interval());

    let listener = super::bind(&settings.bind_address, settings.port).await?;
    info!("Controller API listening on {}:{}", settings.bind_address, settings.port);

    let served = axum::serve(listener, controller_router(service))
        .with_graceful_shutdown(super::shutdown_signal())
        .await
        .context("HTTP server failed");

    sweeper.abort();
    info!("Controller shutting down");
    served
}

fn spawn_stale_sweep(service: Arc<dyn ControllerService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.sweep_stale_nodes().await {
                Ok(flipped) if flipped.is_empty() => debug!("Stale sweep found nothing"),
                Ok(flipped) => info!(count = flipped.len(), "Stale sweep marked nodes offline"),
                Err(e) => warn!(kind = %e.kind(), error = %e, "Stale sweep failed"),
            }
        }
    })
}
