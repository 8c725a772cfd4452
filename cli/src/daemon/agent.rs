// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent daemon: one per simulation host.
//!
//! Startup order is Docker check, service wiring, listener bind, then the
//! registration loop. Registration is repeated every heartbeat interval and
//! never fatal; a Controller that is down at boot is picked up on a later
//! tick. On shutdown the listener drains first, then every known instance
//! is stopped within the configured deadline.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use simfleet_core::application::{AgentService, StandardAgentService};
use simfleet_core::domain::error::ErrorKind;
use simfleet_core::domain::launcher::{HostProbe, HostResources, StaticHostProbe};
use simfleet_core::domain::node::NodeId;
use simfleet_core::domain::node_config::{resolve_secret, NodeConfigManifest};
use simfleet_core::domain::port_pool::PortPool;
use simfleet_core::domain::protocol::RegisterNodeRequest;
use simfleet_core::infrastructure::repositories::InMemoryInstanceRepository;
use simfleet_core::infrastructure::{DockerLauncher, SysinfoHostProbe};
use simfleet_core::presentation::agent_router;
use simfleet_sdk::{ControllerClient, SdkError};

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: NodeConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;
    let node_id = NodeId::new(spec.node.id.clone());

    info!(node_id = %node_id, "simfleet agent starting");

    let launcher = DockerLauncher::new(spec.agent.launcher.clone()).context("Failed to create Docker client")?;
    launcher.healthcheck().await.context("Docker daemon is not reachable")?;

    let host: Arc<dyn HostProbe> = match spec.node.resources {
        Some(declared) => Arc::new(StaticHostProbe(HostResources {
            cpu_cores: declared.cpu_cores,
            memory_gb: declared.memory_gb,
            disk_gb: declared.disk_gb,
        })),
        None => Arc::new(SysinfoHostProbe::new()),
    };

    let range = spec.agent.port_range.to_range().context("Invalid port range")?;
    info!(start = range.start, end = range.end, "Port pool configured");

    let service: Arc<dyn AgentService> = Arc::new(StandardAgentService::new(
        node_id.clone(),
        config.metadata.name.clone(),
        PortPool::new(range),
        Arc::new(InMemoryInstanceRepository::new()),
        Arc::new(launcher),
        host.clone(),
        spec.agent.launcher.stop_grace(),
    ));

    let listener = super::bind(&spec.agent.bind_address, spec.agent.port).await?;
    info!("Agent API listening on {}:{}", spec.agent.bind_address, spec.agent.port);

    let credential = resolve_secret(&spec.agent.credential).context("Failed to resolve agent credential")?;
    let registration = registration_request(&config, credential, host.resources().await);
    let client = ControllerClient::new(spec.agent.controller_url.clone()).with_timeout(REGISTRATION_TIMEOUT);
    let heartbeat = spawn_heartbeat(client, registration, spec.agent.heartbeat_interval());

    let served = axum::serve(listener, agent_router(service.clone()))
        .with_graceful_shutdown(super::shutdown_signal())
        .await
        .context("HTTP server failed");

    heartbeat.abort();

    let deadline = spec.agent.shutdown_deadline();
    info!(deadline_secs = deadline.as_secs(), "Stopping local instances");
    let report = service.shutdown(deadline).await;
    if report.failed > 0 || report.timed_out {
        warn!(
            stopped = report.stopped,
            failed = report.failed,
            timed_out = report.timed_out,
            "Shutdown sweep incomplete"
        );
    } else {
        info!(stopped = report.stopped, "Shutdown sweep complete");
    }

    info!("Agent shutting down");
    served
}

pub fn registration_request(
    config: &NodeConfigManifest,
    credential: String,
    resources: HostResources,
) -> RegisterNodeRequest {
    RegisterNodeRequest {
        node_id: NodeId::new(config.spec.node.id.clone()),
        name: config.metadata.name.clone(),
        address: config.agent_public_address(),
        tags: config.spec.node.tags.iter().cloned().collect(),
        credential,
        cpu_cores: resources.cpu_cores,
        memory_gb: resources.memory_gb,
        disk_gb: resources.disk_gb,
    }
}

/// One registration attempt. Failures are logged with their kind and
/// returned so callers can decide whether to keep going.
pub async fn register_once(client: &ControllerClient, request: &RegisterNodeRequest) -> Result<(), SdkError> {
    match client.register(request).await {
        Ok(ack) => {
            info!(node_id = %ack.node_id, status = %ack.status, "Registered with controller");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::Unauthorized => {
            error!(node_id = %request.node_id, kind = %e.kind(), "Controller rejected the registration credential");
            Err(e)
        }
        Err(e) => {
            warn!(node_id = %request.node_id, kind = %e.kind(), error = %e, "Registration failed, will retry");
            Err(e)
        }
    }
}

fn spawn_heartbeat(client: ControllerClient, request: RegisterNodeRequest, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let _ = register_once(&client, &request).await;
        }
    })
}
