// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Wire Protocol
//!
//! Request and response bodies exchanged between Agents, the Controller and
//! operator clients. Transport-agnostic JSON shapes; the axum routers in
//! `crate::presentation`, the reqwest Agent client and the SDK all share
//! these definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::error::ErrorKind;
use crate::domain::instance::{Instance, InstanceId, InstanceSpec, InstanceState, ProcessHandle, StopTarget};
use crate::domain::node::{Node, NodeCapacity, NodeId, NodeRegistration, NodeStatus};

fn default_model() -> String {
    "iris".to_string()
}

fn default_vehicle_type() -> String {
    "copter".to_string()
}

/// Body of every failed call on either API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    /// Kind reported by the Agent when the Controller relays an Agent rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_kind: Option<ErrorKind>,
}

// ============================================================================
// Agent API
// ============================================================================

/// `Agent.start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInstanceRequest {
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
    #[serde(default)]
    pub mav_udp: Option<u16>,
}

impl StartInstanceRequest {
    pub fn into_spec(self) -> InstanceSpec {
        InstanceSpec {
            name: self.name,
            model: self.model,
            vehicle_type: self.vehicle_type,
            mav_udp: self.mav_udp,
        }
    }
}

impl From<&InstanceSpec> for StartInstanceRequest {
    fn from(spec: &InstanceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            model: spec.model.clone(),
            vehicle_type: spec.vehicle_type.clone(),
            mav_udp: spec.mav_udp,
        }
    }
}

/// Result of `Agent.start` and `Controller.startOnNode`, and one entry of
/// the Agent's instance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub instance_id: InstanceId,
    pub container_id: Option<ProcessHandle>,
    pub name: String,
    pub model: String,
    pub vehicle_type: String,
    pub mav_udp: Option<u16>,
    pub status: InstanceState,
}

impl From<&Instance> for InstanceDescriptor {
    fn from(instance: &Instance) -> Self {
        Self {
            instance_id: instance.id.clone(),
            container_id: instance.process_handle.clone(),
            name: instance.name.clone(),
            model: instance.model.clone(),
            vehicle_type: instance.vehicle_type.clone(),
            mav_udp: instance.mav_udp,
            status: instance.state(),
        }
    }
}

/// `Agent.stop` / `Controller.stopOnNode`. On the wire both keys are
/// optional; internally the request is resolved to a [`StopTarget`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ProcessHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
}

impl StopRequest {
    pub fn by_instance(id: InstanceId) -> Self {
        Self { container_id: None, instance_id: Some(id) }
    }

    /// Container id wins when both keys are present; returns `None` when
    /// neither is.
    pub fn target(&self) -> Option<StopTarget> {
        match (&self.container_id, &self.instance_id) {
            (Some(handle), Some(id)) => {
                tracing::warn!(
                    container_id = %handle,
                    instance_id = %id,
                    "Stop request names both keys, resolving by container id"
                );
                Some(StopTarget::ByContainerId(handle.clone()))
            }
            (Some(handle), None) => Some(StopTarget::ByContainerId(handle.clone())),
            (None, Some(id)) => Some(StopTarget::ByInstanceId(id.clone())),
            (None, None) => None,
        }
    }
}

impl From<StopTarget> for StopRequest {
    fn from(target: StopTarget) -> Self {
        match target {
            StopTarget::ByInstanceId(id) => Self { container_id: None, instance_id: Some(id) },
            StopTarget::ByContainerId(handle) => Self { container_id: Some(handle), instance_id: None },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    pub status: InstanceState,
    pub container_id: Option<ProcessHandle>,
    pub instance_id: Option<InstanceId>,
}

/// `Agent.status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub node_id: NodeId,
    pub name: String,
    pub status: NodeStatus,
    pub running_instances: usize,
    pub total_cpu_cores: u32,
    pub total_memory_gb: u32,
    pub total_disk_gb: u32,
    pub available_ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Controller API
// ============================================================================

/// `Agent.register` call against the Controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub node_id: NodeId,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(alias = "api_key")]
    pub credential: String,
    #[serde(default)]
    pub cpu_cores: u32,
    #[serde(default)]
    pub memory_gb: u32,
    #[serde(default)]
    pub disk_gb: u32,
}

impl RegisterNodeRequest {
    /// Split into the credential and the node attributes.
    pub fn into_parts(self) -> (String, NodeRegistration) {
        let registration = NodeRegistration {
            node_id: self.node_id,
            name: self.name,
            address: self.address,
            tags: self.tags,
            capacity: NodeCapacity {
                cpu_cores: self.cpu_cores,
                memory_gb: self.memory_gb,
                disk_gb: self.disk_gb,
            },
        };
        (self.credential, registration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNodeResponse {
    pub status: String,
    pub node_id: NodeId,
}

/// `Controller.startOnNode`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOnNodeRequest {
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub mav_udp: Option<u16>,
}

impl StartOnNodeRequest {
    /// Resolve defaults: model `iris`, generated `sim-xxxxxx` name.
    pub fn into_spec(self) -> InstanceSpec {
        let name = self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("sim-{}", &suffix[..6])
        });
        InstanceSpec {
            name,
            model: self.model.unwrap_or_else(default_model),
            vehicle_type: self.vehicle_type,
            mav_udp: self.mav_udp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    pub address: String,
    pub tags: BTreeSet<String>,
    pub last_seen: DateTime<Utc>,
    pub status: NodeStatus,
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
}

impl NodeView {
    /// Render `node` with `status` as the caller evaluated it.
    pub fn new(node: Node, status: NodeStatus) -> Self {
        Self {
            id: node.id,
            name: node.name,
            address: node.address,
            tags: node.tags,
            last_seen: node.last_contact,
            status,
            cpu_cores: node.capacity.cpu_cores,
            memory_gb: node.capacity.memory_gb,
            disk_gb: node.capacity.disk_gb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    pub id: InstanceId,
    pub node_id: NodeId,
    pub container_id: Option<ProcessHandle>,
    pub name: String,
    pub vehicle_type: String,
    pub model: String,
    pub mav_udp: Option<u16>,
    pub status: InstanceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Instance> for InstanceView {
    fn from(instance: Instance) -> Self {
        let status = instance.state();
        Self {
            id: instance.id,
            node_id: instance.node_id,
            container_id: instance.process_handle,
            name: instance.name,
            vehicle_type: instance.vehicle_type,
            model: instance.model,
            mav_udp: instance.mav_udp,
            status,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub node_id: NodeId,
    /// Non-terminal controller records compared against the agent.
    pub checked: usize,
    pub marked_stopped: Vec<InstanceId>,
    pub marked_error: Vec<InstanceId>,
    pub promoted_running: Vec<InstanceId>,
    /// Live on the agent but absent from the controller registry.
    pub untracked: Vec<InstanceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub node_id: NodeId,
    pub healthy: bool,
    pub status: NodeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_defaults() {
        let req: StartInstanceRequest = serde_json::from_str(r#"{"name":"alpha"}"#).unwrap();
        assert_eq!(req.model, "iris");
        assert_eq!(req.vehicle_type, "copter");
        assert_eq!(req.mav_udp, None);
    }

    #[test]
    fn test_start_on_node_generates_name() {
        let req: StartOnNodeRequest = serde_json::from_str("{}").unwrap();
        let spec = req.into_spec();
        assert!(spec.name.starts_with("sim-"));
        assert_eq!(spec.name.len(), 10);
        assert_eq!(spec.model, "iris");
        assert_eq!(spec.vehicle_type, "copter");
    }

    #[test]
    fn test_stop_request_resolution() {
        let none = StopRequest::default();
        assert_eq!(none.target(), None);

        let by_id = StopRequest::by_instance(InstanceId::new("i-1"));
        assert_eq!(by_id.target(), Some(StopTarget::ByInstanceId(InstanceId::new("i-1"))));

        let both = StopRequest {
            container_id: Some(ProcessHandle::new("c-1")),
            instance_id: Some(InstanceId::new("i-2")),
        };
        assert_eq!(both.target(), Some(StopTarget::ByContainerId(ProcessHandle::new("c-1"))));
    }

    #[test]
    fn test_register_request_accepts_legacy_api_key_field() {
        let req: RegisterNodeRequest = serde_json::from_str(
            r#"{"node_id":"n1","name":"n","address":"10.0.0.1","api_key":"secret"}"#,
        )
        .unwrap();
        let (credential, registration) = req.into_parts();
        assert_eq!(credential, "secret");
        assert!(registration.tags.is_empty());
        assert_eq!(registration.capacity, NodeCapacity::default());
    }
}
