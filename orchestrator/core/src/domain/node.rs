// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Node Aggregate
//!
//! A registered host running an Agent. Nodes are created or refreshed by
//! registration (which Agents repeat on every heartbeat interval) and are
//! never deleted by the core; retention is an external concern.
//!
//! Status is derived from freshness: a node is considered available only
//! while its stored status is `online` *and* its last contact lies within
//! the Controller's freshness window. The periodic stale sweep persists the
//! `offline` flip, but callers never rely on the sweep having run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "online" => Some(NodeStatus::Online),
            "offline" => Some(NodeStatus::Offline),
            "error" => Some(NodeStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared host capacity. Informational only; nothing admits or rejects
/// instances based on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacity {
    #[serde(default)]
    pub cpu_cores: u32,
    #[serde(default)]
    pub memory_gb: u32,
    #[serde(default)]
    pub disk_gb: u32,
}

/// Attributes an Agent presents when it (re-)registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRegistration {
    pub node_id: NodeId,
    pub name: String,
    pub address: String,
    pub tags: BTreeSet<String>,
    pub capacity: NodeCapacity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub address: String,
    pub tags: BTreeSet<String>,
    pub capacity: NodeCapacity,
    pub status: NodeStatus,
    pub last_contact: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl Node {
    pub fn register(registration: NodeRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id: registration.node_id,
            name: registration.name,
            address: registration.address,
            tags: registration.tags,
            capacity: registration.capacity,
            status: NodeStatus::Online,
            last_contact: now,
            registered_at: now,
        }
    }

    /// Upsert path for a known node: every attribute is replaced, contact is
    /// refreshed and the node comes back online. `registered_at` is kept.
    pub fn refresh(&mut self, registration: NodeRegistration, now: DateTime<Utc>) {
        self.name = registration.name;
        self.address = registration.address;
        self.tags = registration.tags;
        self.capacity = registration.capacity;
        self.touch(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_contact = now;
        self.status = NodeStatus::Online;
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_contact <= window
    }

    /// Stored status with staleness applied.
    pub fn effective_status(&self, now: DateTime<Utc>, window: Duration) -> NodeStatus {
        match self.status {
            NodeStatus::Online if !self.is_fresh(now, window) => NodeStatus::Offline,
            status => status,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.effective_status(now, window) == NodeStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(address: &str) -> NodeRegistration {
        NodeRegistration {
            node_id: NodeId::new("node-a"),
            name: "alpha".to_string(),
            address: address.to_string(),
            tags: BTreeSet::from(["px4-agent".to_string()]),
            capacity: NodeCapacity { cpu_cores: 8, memory_gb: 32, disk_gb: 200 },
        }
    }

    #[test]
    fn test_register_is_online() {
        let now = Utc::now();
        let node = Node::register(registration("10.0.0.1"), now);
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.last_contact, now);
        assert_eq!(node.registered_at, now);
    }

    #[test]
    fn test_refresh_replaces_attributes_and_keeps_registration_time() {
        let t0 = Utc::now();
        let mut node = Node::register(registration("10.0.0.1"), t0);
        node.status = NodeStatus::Offline;

        let t1 = t0 + Duration::seconds(30);
        node.refresh(registration("10.0.0.2"), t1);

        assert_eq!(node.address, "10.0.0.2");
        assert_eq!(node.last_contact, t1);
        assert_eq!(node.registered_at, t0);
        assert_eq!(node.status, NodeStatus::Online);
    }

    #[test]
    fn test_staleness_is_applied_to_online_nodes_only() {
        let t0 = Utc::now();
        let window = Duration::seconds(90);
        let mut node = Node::register(registration("10.0.0.1"), t0);

        assert!(node.is_available(t0 + Duration::seconds(90), window));
        assert_eq!(
            node.effective_status(t0 + Duration::seconds(91), window),
            NodeStatus::Offline
        );

        node.status = NodeStatus::Error;
        assert_eq!(node.effective_status(t0, window), NodeStatus::Error);
        assert!(!node.is_available(t0, window));
    }
}
