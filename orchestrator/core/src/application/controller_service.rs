// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Controller Service - Application Layer
//!
//! Fleet-level start/stop/list over the Node Registry, the Agent RPC port
//! and the Controller-side instance registry.
//!
//! # Consistency
//!
//! The Controller never fabricates success and never guesses the Agent's
//! state. An instance record is written only after the Agent confirmed the
//! launch; a stop updates the record only after the Agent confirmed the
//! stop. When an RPC fails the record is left as it was and the failure is
//! surfaced with its kind. Reads never contact Agents; reconciliation is an
//! explicit operation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::agent_rpc::{AgentRpc, RpcError};
use crate::application::instance_locks::InstanceLocks;
use crate::application::node_registry::{NodeRegistry, NodeRegistryError};
use crate::domain::error::ErrorKind;
use crate::domain::instance::{Instance, InstanceId, InstanceSpec, InstanceState, StopTarget};
use crate::domain::node::{Node, NodeId, NodeRegistration, NodeStatus};
use crate::domain::protocol::{
    InstanceDescriptor, NodeView, ProbeReport, ReconcileReport, StartInstanceRequest, StopAck, StopRequest,
};
use crate::domain::repository::{InstanceRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Node {node_id} is {status}")]
    NodeOffline { node_id: NodeId, status: NodeStatus },

    #[error("No instance matches {0}")]
    InstanceNotFound(String),

    #[error("Instance {instance_id} is already {state}")]
    InvalidState {
        instance_id: InstanceId,
        state: InstanceState,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Registry(NodeRegistryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<NodeRegistryError> for ControllerError {
    fn from(err: NodeRegistryError) -> Self {
        match err {
            NodeRegistryError::NotFound(id) => ControllerError::NodeNotFound(id),
            other => ControllerError::Registry(other),
        }
    }
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::NodeNotFound(_) | ControllerError::InstanceNotFound(_) => ErrorKind::NotFound,
            ControllerError::NodeOffline { .. } => ErrorKind::NodeOffline,
            ControllerError::InvalidState { .. } => ErrorKind::InvalidState,
            ControllerError::Rpc(e) => e.kind(),
            ControllerError::Registry(e) => e.kind(),
            ControllerError::Repository(e) => e.kind(),
        }
    }
}

#[async_trait]
pub trait ControllerService: Send + Sync {
    async fn register_node(&self, credential: &str, registration: NodeRegistration) -> Result<Node, ControllerError>;

    /// Registered nodes in insertion order, status evaluated for staleness.
    async fn list_nodes(&self) -> Result<Vec<NodeView>, ControllerError>;

    async fn get_node(&self, node_id: &NodeId) -> Result<NodeView, ControllerError>;

    async fn start_instance(&self, node_id: &NodeId, spec: InstanceSpec) -> Result<Instance, ControllerError>;

    async fn stop_instance(&self, target: StopTarget) -> Result<StopAck, ControllerError>;

    /// Like [`ControllerService::stop_instance`], but the record must belong
    /// to `node_id`.
    async fn stop_on_node(&self, node_id: &NodeId, target: StopTarget) -> Result<StopAck, ControllerError>;

    async fn list_instances(&self) -> Result<Vec<Instance>, ControllerError>;

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance, ControllerError>;

    async fn reconcile_node(&self, node_id: &NodeId) -> Result<ReconcileReport, ControllerError>;

    async fn probe_node(&self, node_id: &NodeId) -> Result<ProbeReport, ControllerError>;

    /// Persist `offline` for stale nodes; returns the ids flipped.
    async fn sweep_stale_nodes(&self) -> Result<Vec<NodeId>, ControllerError>;
}

pub struct StandardControllerService {
    nodes: Arc<NodeRegistry>,
    instances: Arc<dyn InstanceRepository>,
    rpc: Arc<dyn AgentRpc>,
    locks: InstanceLocks,
}

impl StandardControllerService {
    pub fn new(nodes: Arc<NodeRegistry>, instances: Arc<dyn InstanceRepository>, rpc: Arc<dyn AgentRpc>) -> Self {
        Self {
            nodes,
            instances,
            rpc,
            locks: InstanceLocks::new(),
        }
    }

    /// Resolve a node and require it to be online and fresh.
    async fn available_node(&self, node_id: &NodeId) -> Result<Node, ControllerError> {
        let node = self.nodes.get(node_id).await?;
        let status = self.nodes.effective_status(&node, Utc::now());
        if status != NodeStatus::Online {
            return Err(ControllerError::NodeOffline {
                node_id: node.id,
                status,
            });
        }
        Ok(node)
    }

    async fn resolve(&self, target: &StopTarget) -> Result<Instance, ControllerError> {
        let found = match target {
            StopTarget::ByInstanceId(id) => self.instances.find_by_id(id).await?,
            StopTarget::ByContainerId(handle) => self.instances.find_by_handle(handle).await?,
        };
        found.ok_or_else(|| ControllerError::InstanceNotFound(target.to_string()))
    }

    fn record_rpc_failure(&self, node_id: &NodeId, op: &'static str, err: &RpcError) {
        metrics::counter!("simfleet_agent_rpc_failures_total", "kind" => err.kind().as_str()).increment(1);
        warn!(node_id = %node_id, op, kind = %err.kind(), error = %err, "Agent call failed");
    }

    fn rpc_failed(&self, node_id: &NodeId, op: &'static str, err: RpcError) -> ControllerError {
        self.record_rpc_failure(node_id, op, &err);
        ControllerError::Rpc(err)
    }

    async fn stop_record(&self, instance: Instance) -> Result<StopAck, ControllerError> {
        let _guard = self.locks.acquire(&instance.id).await;
        // Re-read under the lock; another stop may have completed meanwhile.
        let instance = self
            .instances
            .find_by_id(&instance.id)
            .await?
            .ok_or_else(|| ControllerError::InstanceNotFound(format!("instance {}", instance.id)))?;

        if instance.is_terminal() {
            return Err(ControllerError::InvalidState {
                state: instance.state(),
                instance_id: instance.id,
            });
        }

        let node = self.available_node(&instance.node_id).await?;
        let request = StopRequest::by_instance(instance.id.clone());
        self.rpc
            .stop(&node, &request)
            .await
            .map_err(|e| self.rpc_failed(&node.id, "stop", e))?;

        let updated = self
            .instances
            .update(
                &instance.id,
                Box::new(|i: &mut Instance| {
                    if i.state() != InstanceState::Stopping {
                        i.transition(InstanceState::Stopping)?;
                    }
                    i.transition(InstanceState::Stopped)
                }),
            )
            .await?;
        // Terminal records take no further locked operations.
        self.locks.forget(&updated.id);
        metrics::counter!("simfleet_instances_stopped_total").increment(1);
        info!(instance_id = %updated.id, node_id = %updated.node_id, "Instance stopped");

        Ok(StopAck {
            status: updated.state(),
            container_id: updated.process_handle,
            instance_id: Some(updated.id),
        })
    }
}

#[async_trait]
impl ControllerService for StandardControllerService {
    async fn register_node(&self, credential: &str, registration: NodeRegistration) -> Result<Node, ControllerError> {
        Ok(self.nodes.register(credential, registration).await?)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeView>, ControllerError> {
        let now = Utc::now();
        Ok(self
            .nodes
            .list()
            .await?
            .into_iter()
            .map(|node| {
                let status = self.nodes.effective_status(&node, now);
                NodeView::new(node, status)
            })
            .collect())
    }

    async fn get_node(&self, node_id: &NodeId) -> Result<NodeView, ControllerError> {
        let node = self.nodes.get(node_id).await?;
        let status = self.nodes.effective_status(&node, Utc::now());
        Ok(NodeView::new(node, status))
    }

    async fn start_instance(&self, node_id: &NodeId, spec: InstanceSpec) -> Result<Instance, ControllerError> {
        let node = self.available_node(node_id).await?;

        let request = StartInstanceRequest::from(&spec);
        let descriptor: InstanceDescriptor = self
            .rpc
            .start(&node, &request)
            .await
            .map_err(|e| self.rpc_failed(&node.id, "start", e))?;

        let confirmed = InstanceSpec {
            name: descriptor.name.clone(),
            model: descriptor.model.clone(),
            vehicle_type: descriptor.vehicle_type.clone(),
            mav_udp: descriptor.mav_udp,
        };
        let mut instance = Instance::new(descriptor.instance_id.clone(), node.id.clone(), &confirmed, descriptor.mav_udp);
        if descriptor.status == InstanceState::Running {
            let confirmed = match descriptor.container_id.clone() {
                Some(handle) => instance.confirm_running(handle),
                None => instance.transition(InstanceState::Running),
            };
            confirmed.map_err(RepositoryError::from)?;
        }

        if let Err(e) = self.instances.insert(&instance).await {
            // The Agent is running it; only the fleet record is missing.
            error!(
                instance_id = %instance.id,
                node_id = %node.id,
                kind = %e.kind(),
                error = %e,
                "Instance started on agent but could not be recorded"
            );
            return Err(e.into());
        }

        metrics::counter!("simfleet_instances_started_total").increment(1);
        info!(
            instance_id = %instance.id,
            node_id = %node.id,
            port = ?instance.mav_udp,
            state = %instance.state(),
            "Instance started"
        );
        Ok(instance)
    }

    async fn stop_instance(&self, target: StopTarget) -> Result<StopAck, ControllerError> {
        let instance = self.resolve(&target).await?;
        self.stop_record(instance).await
    }

    async fn stop_on_node(&self, node_id: &NodeId, target: StopTarget) -> Result<StopAck, ControllerError> {
        self.nodes.get(node_id).await?;
        let instance = self.resolve(&target).await?;
        if &instance.node_id != node_id {
            return Err(ControllerError::InstanceNotFound(format!("{target} on node {node_id}")));
        }
        self.stop_record(instance).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, ControllerError> {
        Ok(self.instances.list_all().await?)
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance, ControllerError> {
        self.instances
            .find_by_id(id)
            .await?
            .ok_or_else(|| ControllerError::InstanceNotFound(format!("instance {id}")))
    }

    async fn reconcile_node(&self, node_id: &NodeId) -> Result<ReconcileReport, ControllerError> {
        let node = self.nodes.get(node_id).await?;
        let live = self
            .rpc
            .instances(&node)
            .await
            .map_err(|e| self.rpc_failed(&node.id, "instances", e))?;
        self.nodes.touch(&node.id).await?;

        let on_agent: HashMap<InstanceId, InstanceDescriptor> =
            live.into_iter().map(|d| (d.instance_id.clone(), d)).collect();
        let records = self.instances.list_by_node(&node.id).await?;

        let mut report = ReconcileReport {
            node_id: node.id.clone(),
            untracked: on_agent
                .keys()
                .filter(|id| !records.iter().any(|r| &r.id == *id))
                .cloned()
                .collect(),
            ..Default::default()
        };
        report.untracked.sort();

        for record in records.iter().filter(|r| !r.is_terminal()) {
            report.checked += 1;
            let _guard = self.locks.acquire(&record.id).await;
            let Some(current) = self.instances.find_by_id(&record.id).await? else {
                continue;
            };
            if current.is_terminal() {
                continue;
            }

            match on_agent.get(&current.id).map(|d| (d.status, d.container_id.clone())) {
                None | Some((InstanceState::Stopped, _)) => {
                    self.instances
                        .update(&current.id, Box::new(|i: &mut Instance| i.transition(InstanceState::Stopped)))
                        .await?;
                    self.locks.forget(&current.id);
                    report.marked_stopped.push(current.id.clone());
                }
                Some((InstanceState::Error, _)) => {
                    self.instances
                        .update(&current.id, Box::new(|i: &mut Instance| i.transition(InstanceState::Error)))
                        .await?;
                    self.locks.forget(&current.id);
                    report.marked_error.push(current.id.clone());
                }
                Some((InstanceState::Running, handle)) if current.state() == InstanceState::Starting => {
                    self.instances
                        .update(
                            &current.id,
                            Box::new(move |i: &mut Instance| match handle {
                                Some(h) => i.confirm_running(h),
                                None => i.transition(InstanceState::Running),
                            }),
                        )
                        .await?;
                    report.promoted_running.push(current.id.clone());
                }
                Some(_) => {}
            }
        }

        info!(
            node_id = %node.id,
            checked = report.checked,
            stopped = report.marked_stopped.len(),
            errored = report.marked_error.len(),
            promoted = report.promoted_running.len(),
            untracked = report.untracked.len(),
            "Reconciled node"
        );
        Ok(report)
    }

    async fn probe_node(&self, node_id: &NodeId) -> Result<ProbeReport, ControllerError> {
        let node = self.nodes.get(node_id).await?;
        let (healthy, status) = match self.rpc.health(&node).await {
            Ok(true) => {
                self.nodes.touch(&node.id).await?;
                (true, NodeStatus::Online)
            }
            Ok(false) => {
                self.nodes.set_status(&node.id, NodeStatus::Error).await?;
                (false, NodeStatus::Error)
            }
            Err(e) => {
                let status = match e {
                    RpcError::Unreachable { .. } => NodeStatus::Offline,
                    _ => NodeStatus::Error,
                };
                self.record_rpc_failure(&node.id, "health", &e);
                self.nodes.set_status(&node.id, status).await?;
                (false, status)
            }
        };
        info!(node_id = %node.id, healthy, status = %status, "Probed node");
        Ok(ProbeReport {
            node_id: node.id,
            healthy,
            status,
        })
    }

    async fn sweep_stale_nodes(&self) -> Result<Vec<NodeId>, ControllerError> {
        Ok(self.nodes.mark_stale_offline(Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::node_registry::SharedSecretVerifier;
    use crate::domain::instance::ProcessHandle;
    use crate::domain::node::NodeCapacity;
    use crate::domain::protocol::AgentStatusReport;
    use crate::infrastructure::repositories::{InMemoryInstanceRepository, InMemoryNodeRepository};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    const KEY: &str = "agent-registration-key";

    /// Scripted agent: answers from a queue of outcomes and records calls.
    #[derive(Default)]
    struct FakeRpc {
        fail_with: Mutex<Option<RpcError>>,
        next_port: Mutex<u16>,
        live: Mutex<Vec<InstanceDescriptor>>,
        health: Mutex<Option<bool>>,
        stops: Mutex<Vec<StopRequest>>,
    }

    impl FakeRpc {
        fn check(&self) -> Result<(), RpcError> {
            match self.fail_with.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl AgentRpc for FakeRpc {
        async fn start(&self, _node: &Node, request: &StartInstanceRequest) -> Result<InstanceDescriptor, RpcError> {
            self.check()?;
            let mut port = self.next_port.lock();
            let mav_udp = request.mav_udp.unwrap_or(14560 + *port);
            *port += 1;
            let id = InstanceId::generate();
            let desc = InstanceDescriptor {
                container_id: Some(ProcessHandle::new(format!("ctr-{}", id.short()))),
                instance_id: id,
                name: request.name.clone(),
                model: request.model.clone(),
                vehicle_type: request.vehicle_type.clone(),
                mav_udp: Some(mav_udp),
                status: InstanceState::Running,
            };
            self.live.lock().push(desc.clone());
            Ok(desc)
        }

        async fn stop(&self, _node: &Node, request: &StopRequest) -> Result<StopAck, RpcError> {
            self.check()?;
            self.stops.lock().push(request.clone());
            self.live
                .lock()
                .retain(|d| Some(&d.instance_id) != request.instance_id.as_ref());
            Ok(StopAck {
                status: InstanceState::Stopped,
                container_id: request.container_id.clone(),
                instance_id: request.instance_id.clone(),
            })
        }

        async fn status(&self, node: &Node) -> Result<AgentStatusReport, RpcError> {
            self.check()?;
            Ok(AgentStatusReport {
                node_id: node.id.clone(),
                name: node.name.clone(),
                status: NodeStatus::Online,
                running_instances: self.live.lock().len(),
                total_cpu_cores: 4,
                total_memory_gb: 8,
                total_disk_gb: 50,
                available_ports: vec![],
            })
        }

        async fn instances(&self, _node: &Node) -> Result<Vec<InstanceDescriptor>, RpcError> {
            self.check()?;
            Ok(self.live.lock().clone())
        }

        async fn health(&self, _node: &Node) -> Result<bool, RpcError> {
            self.check()?;
            Ok(self.health.lock().unwrap_or(true))
        }
    }

    struct Harness {
        svc: StandardControllerService,
        rpc: Arc<FakeRpc>,
        nodes: Arc<NodeRegistry>,
    }

    async fn harness() -> Harness {
        let nodes = Arc::new(NodeRegistry::new(
            Arc::new(InMemoryNodeRepository::new()),
            Arc::new(SharedSecretVerifier::new(KEY)),
            chrono::Duration::seconds(90),
        ));
        let rpc = Arc::new(FakeRpc::default());
        let svc = StandardControllerService::new(nodes.clone(), Arc::new(InMemoryInstanceRepository::new()), rpc.clone());
        svc.register_node(KEY, registration("node-a")).await.unwrap();
        Harness { svc, rpc, nodes }
    }

    fn registration(id: &str) -> NodeRegistration {
        NodeRegistration {
            node_id: NodeId::new(id),
            name: id.to_string(),
            address: "127.0.0.1:8443".to_string(),
            tags: BTreeSet::new(),
            capacity: NodeCapacity::default(),
        }
    }

    fn spec(name: &str) -> InstanceSpec {
        InstanceSpec {
            name: name.to_string(),
            model: "iris".to_string(),
            vehicle_type: "copter".to_string(),
            mav_udp: None,
        }
    }

    fn unreachable() -> RpcError {
        RpcError::Unreachable {
            node_id: NodeId::new("node-a"),
            reason: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_records_running_instance() {
        let h = harness().await;
        let inst = h.svc.start_instance(&NodeId::new("node-a"), spec("alpha")).await.unwrap();
        assert_eq!(inst.state(), InstanceState::Running);
        assert_eq!(inst.mav_udp, Some(14560));
        assert!(inst.process_handle.is_some());
        assert_eq!(h.svc.get_instance(&inst.id).await.unwrap(), inst);
    }

    #[tokio::test]
    async fn test_start_on_unknown_or_offline_node() {
        let h = harness().await;
        let err = h.svc.start_instance(&NodeId::new("ghost"), spec("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        h.nodes.set_status(&NodeId::new("node-a"), NodeStatus::Offline).await.unwrap();
        let err = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeOffline);
        assert!(h.svc.list_instances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_with_unreachable_agent_persists_nothing() {
        let h = harness().await;
        *h.rpc.fail_with.lock() = Some(unreachable());
        let err = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert!(h.svc.list_instances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_rejection_is_relayed() {
        let h = harness().await;
        *h.rpc.fail_with.lock() = Some(RpcError::AgentError {
            node_id: NodeId::new("node-a"),
            status: 503,
            body: r#"{"kind":"exhausted","message":"Port pool 14560-14570 is exhausted"}"#.to_string(),
        });
        let err = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AgentError);
        match err {
            ControllerError::Rpc(rpc) => assert_eq!(rpc.remote_kind(), Some(ErrorKind::Exhausted)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_transitions_to_stopped_once() {
        let h = harness().await;
        let inst = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap();

        let ack = h.svc.stop_instance(StopTarget::ByInstanceId(inst.id.clone())).await.unwrap();
        assert_eq!(ack.status, InstanceState::Stopped);
        assert_eq!(h.svc.get_instance(&inst.id).await.unwrap().state(), InstanceState::Stopped);
        assert_eq!(h.rpc.stops.lock()[0].instance_id, Some(inst.id.clone()));

        let err = h.svc.stop_instance(StopTarget::ByInstanceId(inst.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_stop_by_container_handle() {
        let h = harness().await;
        let inst = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap();
        let handle = inst.process_handle.clone().unwrap();
        h.svc.stop_instance(StopTarget::ByContainerId(handle)).await.unwrap();
        assert_eq!(h.svc.get_instance(&inst.id).await.unwrap().state(), InstanceState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_on_offline_node_leaves_record_untouched() {
        let h = harness().await;
        let inst = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap();

        h.nodes.set_status(&NodeId::new("node-a"), NodeStatus::Offline).await.unwrap();
        let err = h.svc.stop_instance(StopTarget::ByInstanceId(inst.id.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NodeOffline);
        assert_eq!(h.svc.get_instance(&inst.id).await.unwrap(), inst);
        assert!(h.rpc.stops.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stop_with_unreachable_agent_leaves_record_untouched() {
        let h = harness().await;
        let inst = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap();

        *h.rpc.fail_with.lock() = Some(unreachable());
        let err = h.svc.stop_instance(StopTarget::ByInstanceId(inst.id.clone())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert_eq!(h.svc.get_instance(&inst.id).await.unwrap(), inst);
    }

    #[tokio::test]
    async fn test_stop_on_node_requires_ownership() {
        let h = harness().await;
        h.svc.register_node(KEY, registration("node-b")).await.unwrap();
        let inst = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap();

        let err = h
            .svc
            .stop_on_node(&NodeId::new("node-b"), StopTarget::ByInstanceId(inst.id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        h.svc
            .stop_on_node(&NodeId::new("node-a"), StopTarget::ByInstanceId(inst.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_marks_vanished_instances_stopped() {
        let h = harness().await;
        let a = h.svc.start_instance(&NodeId::new("node-a"), spec("a")).await.unwrap();
        let b = h.svc.start_instance(&NodeId::new("node-a"), spec("b")).await.unwrap();

        // a dies on the agent side; an instance appears the controller never saw
        h.rpc.live.lock().retain(|d| d.instance_id != a.id);
        h.rpc.live.lock().push(InstanceDescriptor {
            instance_id: InstanceId::new("stray"),
            container_id: None,
            name: "stray".to_string(),
            model: "iris".to_string(),
            vehicle_type: "copter".to_string(),
            mav_udp: Some(14569),
            status: InstanceState::Running,
        });

        let report = h.svc.reconcile_node(&NodeId::new("node-a")).await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.marked_stopped, vec![a.id.clone()]);
        assert_eq!(report.untracked, vec![InstanceId::new("stray")]);
        assert_eq!(h.svc.get_instance(&a.id).await.unwrap().state(), InstanceState::Stopped);
        assert_eq!(h.svc.get_instance(&b.id).await.unwrap().state(), InstanceState::Running);
    }

    #[tokio::test]
    async fn test_probe_updates_node_status() {
        let h = harness().await;
        let node = NodeId::new("node-a");

        let report = h.svc.probe_node(&node).await.unwrap();
        assert!(report.healthy);
        assert_eq!(report.status, NodeStatus::Online);

        *h.rpc.health.lock() = Some(false);
        let report = h.svc.probe_node(&node).await.unwrap();
        assert_eq!(report.status, NodeStatus::Error);
        assert_eq!(h.svc.get_node(&node).await.unwrap().status, NodeStatus::Error);

        *h.rpc.fail_with.lock() = Some(unreachable());
        let report = h.svc.probe_node(&node).await.unwrap();
        assert!(!report.healthy);
        assert_eq!(h.svc.get_node(&node).await.unwrap().status, NodeStatus::Offline);
    }

    #[tokio::test]
    async fn test_stopped_instances_release_their_lock_entries() {
        let h = harness().await;
        let node = NodeId::new("node-a");
        let a = h.svc.start_instance(&node, spec("a")).await.unwrap();
        let b = h.svc.start_instance(&node, spec("b")).await.unwrap();

        h.svc.stop_instance(StopTarget::ByInstanceId(a.id.clone())).await.unwrap();
        assert!(h.svc.locks.is_empty());

        h.rpc.live.lock().clear();
        h.svc.reconcile_node(&node).await.unwrap();
        assert_eq!(h.svc.get_instance(&b.id).await.unwrap().state(), InstanceState::Stopped);
        assert!(h.svc.locks.is_empty());
    }

    #[tokio::test]
    async fn test_restart_under_same_name_gets_new_identifier() {
        let h = harness().await;
        let node = NodeId::new("node-a");
        let first = h.svc.start_instance(&node, spec("alpha")).await.unwrap();
        h.svc.stop_instance(StopTarget::ByInstanceId(first.id.clone())).await.unwrap();
        let second = h.svc.start_instance(&node, spec("alpha")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(h.svc.list_instances().await.unwrap().len(), 2);
    }
}
