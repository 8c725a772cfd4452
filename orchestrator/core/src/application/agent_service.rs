// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Service - Application Layer
//!
//! Single-host authority for instance lifecycle. Owns the node's port pool
//! and its local instance registry, and drives the process launcher.
//!
//! # Resource discipline
//!
//! A port reserved for a start is released on every failure path before the
//! error is surfaced, and released exactly once on the success path of a
//! stop (or at the moment `list` observes that the process died). The pool
//! mutex is never held across an await point; record-level races are
//! serialized through [`InstanceLocks`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::instance_locks::InstanceLocks;
use crate::domain::error::ErrorKind;
use crate::domain::instance::{Instance, InstanceId, InstanceSpec, InstanceState, ProcessHandle, StopTarget};
use crate::domain::launcher::{HostProbe, HostResources, InstanceLauncher, LaunchSpec, LauncherError};
use crate::domain::node::{NodeId, NodeStatus};
use crate::domain::port_pool::{PortError, PortPool};
use crate::domain::protocol::{AgentStatusReport, InstanceDescriptor, StopAck};
use crate::domain::repository::{InstanceRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum AgentServiceError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error("Launch of '{name}' failed: {source}")]
    LaunchFailed {
        name: String,
        #[source]
        source: LauncherError,
    },

    #[error("No instance matches {0}")]
    NotFound(String),

    #[error("Failed to stop instance {instance_id}: {source}")]
    StopFailed {
        instance_id: InstanceId,
        #[source]
        source: LauncherError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AgentServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentServiceError::Port(e) => e.kind(),
            AgentServiceError::LaunchFailed { .. } => ErrorKind::LaunchFailed,
            AgentServiceError::NotFound(_) => ErrorKind::NotFound,
            AgentServiceError::StopFailed { .. } => ErrorKind::StopFailed,
            AgentServiceError::Repository(e) => e.kind(),
        }
    }
}

/// Outcome of the best-effort stop sweep run when the Agent shuts down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub stopped: usize,
    pub failed: usize,
    /// The overall deadline elapsed before every instance was visited.
    pub timed_out: bool,
}

#[async_trait]
pub trait AgentService: Send + Sync {
    fn node_id(&self) -> &NodeId;

    async fn start(&self, spec: InstanceSpec) -> Result<InstanceDescriptor, AgentServiceError>;

    async fn stop(&self, target: StopTarget) -> Result<StopAck, AgentServiceError>;

    /// Local registry in insertion order, each record refreshed against
    /// launcher liveness first.
    async fn list(&self) -> Result<Vec<InstanceDescriptor>, AgentServiceError>;

    async fn resources(&self) -> HostResources;

    async fn status(&self) -> Result<AgentStatusReport, AgentServiceError>;

    /// Stop every known instance, giving up once `deadline` has elapsed.
    async fn shutdown(&self, deadline: Duration) -> ShutdownReport;
}

pub struct StandardAgentService {
    node_id: NodeId,
    node_name: String,
    ports: Mutex<PortPool>,
    registry: Arc<dyn InstanceRepository>,
    launcher: Arc<dyn InstanceLauncher>,
    host: Arc<dyn HostProbe>,
    locks: InstanceLocks,
    stop_grace: Duration,
}

impl StandardAgentService {
    pub fn new(
        node_id: NodeId,
        node_name: impl Into<String>,
        ports: PortPool,
        registry: Arc<dyn InstanceRepository>,
        launcher: Arc<dyn InstanceLauncher>,
        host: Arc<dyn HostProbe>,
        stop_grace: Duration,
    ) -> Self {
        let service = Self {
            node_id,
            node_name: node_name.into(),
            ports: Mutex::new(ports),
            registry,
            launcher,
            host,
            locks: InstanceLocks::new(),
            stop_grace,
        };
        service.record_pool_gauge();
        service
    }

    pub fn available_ports(&self) -> Vec<u16> {
        self.ports.lock().available_ports()
    }

    fn release_port(&self, port: Option<u16>) {
        if let Some(port) = port {
            self.ports.lock().release(port);
            debug!(port, "Released port");
            self.record_pool_gauge();
        }
    }

    fn record_pool_gauge(&self) {
        let available = self.ports.lock().available_count();
        metrics::gauge!("simfleet_ports_available").set(available as f64);
    }

    fn launch_spec(&self, id: &InstanceId, spec: &InstanceSpec, port: u16) -> LaunchSpec {
        let mut env = BTreeMap::new();
        env.insert("PX4_SIM_UDP_PORT".to_string(), port.to_string());
        env.insert("HEADLESS".to_string(), "1".to_string());
        env.insert("PX4_INSTANCE".to_string(), "0".to_string());
        LaunchSpec {
            instance_id: id.clone(),
            name: spec.name.clone(),
            model: spec.model.clone(),
            vehicle_type: spec.vehicle_type.clone(),
            udp_port: port,
            env,
        }
    }

    /// Undo a launch whose record could not be stored.
    async fn abandon(&self, handle: &ProcessHandle, port: u16) {
        if let Err(e) = self.launcher.terminate(handle, self.stop_grace).await {
            error!(container_id = %handle, kind = %e.kind(), error = %e, "Failed to clean up unrecorded instance");
        }
        self.release_port(Some(port));
    }

    async fn resolve(&self, target: &StopTarget) -> Result<Instance, AgentServiceError> {
        let found = match target {
            StopTarget::ByInstanceId(id) => self.registry.find_by_id(id).await?,
            StopTarget::ByContainerId(handle) => self.registry.find_by_handle(handle).await?,
        };
        found.ok_or_else(|| AgentServiceError::NotFound(target.to_string()))
    }

    /// Probe one live record and downgrade it to `stopped` if its process is
    /// gone. Probe failures leave the record untouched. `None` when a
    /// concurrent stop removed the record meanwhile.
    async fn refresh(&self, instance: Instance) -> Result<Option<Instance>, AgentServiceError> {
        if !matches!(instance.state(), InstanceState::Starting | InstanceState::Running) {
            return Ok(Some(instance));
        }
        let Some(handle) = instance.process_handle.clone() else {
            return Ok(Some(instance));
        };

        match self.launcher.is_alive(&handle).await {
            Ok(true) => Ok(Some(instance)),
            Ok(false) => {
                let _guard = self.locks.acquire(&instance.id).await;
                // Re-check under the lock; a concurrent stop may have won.
                let Some(current) = self.registry.find_by_id(&instance.id).await? else {
                    return Ok(None);
                };
                if !matches!(current.state(), InstanceState::Starting | InstanceState::Running) {
                    return Ok(Some(current));
                }
                let updated = self
                    .registry
                    .update(&instance.id, Box::new(|i: &mut Instance| i.transition(InstanceState::Stopped)))
                    .await?;
                self.release_port(updated.mav_udp);
                warn!(
                    instance_id = %updated.id,
                    container_id = %handle,
                    "Instance process exited out of band, marked stopped"
                );
                Ok(Some(updated))
            }
            Err(e) => {
                warn!(
                    instance_id = %instance.id,
                    kind = %e.kind(),
                    error = %e,
                    "Liveness probe failed, keeping recorded state"
                );
                Ok(Some(instance))
            }
        }
    }

    async fn stop_locked(&self, id: &InstanceId, grace: Duration) -> Result<StopAck, AgentServiceError> {
        let _guard = self.locks.acquire(id).await;
        let instance = self
            .registry
            .find_by_id(id)
            .await?
            .ok_or_else(|| AgentServiceError::NotFound(format!("instance {id}")))?;

        let ack = StopAck {
            status: InstanceState::Stopped,
            container_id: instance.process_handle.clone(),
            instance_id: Some(instance.id.clone()),
        };

        // Port already went back to the pool when the exit was observed.
        if instance.state() == InstanceState::Stopped {
            self.registry.remove(id).await?;
            self.locks.forget(id);
            info!(instance_id = %id, "Removed already-stopped instance");
            return Ok(ack);
        }

        if matches!(instance.state(), InstanceState::Starting | InstanceState::Running) {
            self.registry
                .update(id, Box::new(|i: &mut Instance| i.transition(InstanceState::Stopping)))
                .await?;
        }

        if let Some(handle) = &instance.process_handle {
            if let Err(source) = self.launcher.terminate(handle, grace).await {
                error!(
                    instance_id = %id,
                    container_id = %handle,
                    kind = %source.kind(),
                    error = %source,
                    "Failed to terminate instance"
                );
                if instance.state() != InstanceState::Error {
                    self.registry
                        .update(id, Box::new(|i: &mut Instance| i.transition(InstanceState::Error)))
                        .await?;
                }
                return Err(AgentServiceError::StopFailed {
                    instance_id: id.clone(),
                    source,
                });
            }
        }

        self.release_port(instance.mav_udp);
        self.registry.remove(id).await?;
        self.locks.forget(id);
        metrics::counter!("simfleet_instances_stopped_total").increment(1);
        info!(instance_id = %id, port = ?instance.mav_udp, "Instance stopped");
        Ok(ack)
    }
}

#[async_trait]
impl AgentService for StandardAgentService {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn start(&self, spec: InstanceSpec) -> Result<InstanceDescriptor, AgentServiceError> {
        let port = self.ports.lock().acquire(spec.mav_udp)?;
        self.record_pool_gauge();

        let id = InstanceId::generate();
        let launch = self.launch_spec(&id, &spec, port);
        info!(instance_id = %id, name = %spec.name, model = %spec.model, port, "Launching instance");

        let handle = match self.launcher.launch(&launch).await {
            Ok(handle) => handle,
            Err(source) => {
                self.release_port(Some(port));
                metrics::counter!("simfleet_launch_failures_total").increment(1);
                error!(instance_id = %id, port, kind = %source.kind(), error = %source, "Launch failed");
                return Err(AgentServiceError::LaunchFailed {
                    name: spec.name,
                    source,
                });
            }
        };

        let mut instance = Instance::new(id, self.node_id.clone(), &spec, Some(port));
        if let Err(e) = instance.confirm_running(handle.clone()) {
            self.abandon(&handle, port).await;
            return Err(RepositoryError::from(e).into());
        }
        if let Err(e) = self.registry.insert(&instance).await {
            self.abandon(&handle, port).await;
            return Err(e.into());
        }

        metrics::counter!("simfleet_instances_started_total").increment(1);
        info!(instance_id = %instance.id, container_id = %handle, port, "Instance running");
        Ok(InstanceDescriptor::from(&instance))
    }

    async fn stop(&self, target: StopTarget) -> Result<StopAck, AgentServiceError> {
        let instance = self.resolve(&target).await?;
        self.stop_locked(&instance.id, self.stop_grace).await
    }

    async fn list(&self) -> Result<Vec<InstanceDescriptor>, AgentServiceError> {
        let mut out = Vec::new();
        for instance in self.registry.list_all().await? {
            if let Some(refreshed) = self.refresh(instance).await? {
                out.push(InstanceDescriptor::from(&refreshed));
            }
        }
        Ok(out)
    }

    async fn resources(&self) -> HostResources {
        self.host.resources().await
    }

    async fn status(&self) -> Result<AgentStatusReport, AgentServiceError> {
        let instances = self.list().await?;
        let running = instances
            .iter()
            .filter(|i| i.status == InstanceState::Running)
            .count();
        let resources = self.resources().await;
        Ok(AgentStatusReport {
            node_id: self.node_id.clone(),
            name: self.node_name.clone(),
            status: NodeStatus::Online,
            running_instances: running,
            total_cpu_cores: resources.cpu_cores,
            total_memory_gb: resources.memory_gb,
            total_disk_gb: resources.disk_gb,
            available_ports: self.available_ports(),
        })
    }

    async fn shutdown(&self, deadline: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let instances = match self.registry.list_all().await {
            Ok(instances) => instances,
            Err(e) => {
                error!(kind = %e.kind(), error = %e, "Shutdown sweep could not list instances");
                return report;
            }
        };
        if instances.is_empty() {
            return report;
        }
        info!(count = instances.len(), "Stopping all instances before shutdown");

        let sweep = async {
            for instance in &instances {
                match self.stop_locked(&instance.id, self.stop_grace).await {
                    Ok(_) => report.stopped += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            instance_id = %instance.id,
                            kind = %e.kind(),
                            error = %e,
                            "Shutdown sweep failed to stop instance"
                        );
                    }
                }
            }
        };
        if tokio::time::timeout(deadline, sweep).await.is_err() {
            report.timed_out = true;
            warn!(?deadline, "Shutdown sweep deadline elapsed");
        }
        report
    }
}
