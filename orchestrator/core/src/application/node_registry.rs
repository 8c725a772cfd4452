// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Node Registry - Application Layer
//!
//! Controller-side record of known Agents. Registration is an upsert that
//! also serves as the Agent heartbeat; freshness is evaluated against a
//! fixed window both by the periodic stale sweep and at call time.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::error::ErrorKind;
use crate::domain::node::{Node, NodeId, NodeRegistration, NodeStatus};
use crate::domain::repository::{NodeRepository, RepositoryError};

/// Decides whether a registering Agent presented the expected credential.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, presented: &str) -> bool;
}

/// Single shared secret for every Agent.
pub struct SharedSecretVerifier {
    secret: Vec<u8>,
}

impl SharedSecretVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }
}

impl CredentialVerifier for SharedSecretVerifier {
    fn verify(&self, presented: &str) -> bool {
        let expected = self.secret.as_slice();
        let presented = presented.as_bytes();
        if presented.len() != expected.len() {
            // burn the same comparison time on length mismatch
            let _ = expected.ct_eq(expected);
            return false;
        }
        expected.ct_eq(presented).into()
    }
}

#[derive(Debug, Error)]
pub enum NodeRegistryError {
    #[error("Registration of node {0} rejected: invalid credential")]
    Unauthorized(NodeId),

    #[error("Node {0} not found")]
    NotFound(NodeId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl NodeRegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeRegistryError::Unauthorized(_) => ErrorKind::Unauthorized,
            NodeRegistryError::NotFound(_) => ErrorKind::NotFound,
            NodeRegistryError::Repository(e) => e.kind(),
        }
    }
}

pub struct NodeRegistry {
    repository: Arc<dyn NodeRepository>,
    verifier: Arc<dyn CredentialVerifier>,
    freshness: Duration,
}

impl NodeRegistry {
    pub fn new(
        repository: Arc<dyn NodeRepository>,
        verifier: Arc<dyn CredentialVerifier>,
        freshness: Duration,
    ) -> Self {
        Self {
            repository,
            verifier,
            freshness,
        }
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness
    }

    /// Create or refresh a node. Unknown ids are created `online`; known ids
    /// have every attribute replaced and come back `online`.
    pub async fn register(
        &self,
        credential: &str,
        registration: NodeRegistration,
    ) -> Result<Node, NodeRegistryError> {
        if !self.verifier.verify(credential) {
            warn!(node_id = %registration.node_id, "Rejected registration with invalid credential");
            return Err(NodeRegistryError::Unauthorized(registration.node_id));
        }

        let now = Utc::now();
        let node = match self.repository.find_by_id(&registration.node_id).await? {
            Some(mut existing) => {
                existing.refresh(registration, now);
                debug!(node_id = %existing.id, address = %existing.address, "Refreshed node registration");
                existing
            }
            None => {
                let node = Node::register(registration, now);
                info!(node_id = %node.id, name = %node.name, address = %node.address, "Registered new node");
                node
            }
        };
        self.repository.save(&node).await?;
        metrics::counter!("simfleet_node_registrations_total").increment(1);
        Ok(node)
    }

    pub async fn get(&self, id: &NodeId) -> Result<Node, NodeRegistryError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| NodeRegistryError::NotFound(id.clone()))
    }

    /// Insertion order, stable across calls.
    pub async fn list(&self) -> Result<Vec<Node>, NodeRegistryError> {
        Ok(self.repository.list_all().await?)
    }

    pub fn effective_status(&self, node: &Node, now: DateTime<Utc>) -> NodeStatus {
        node.effective_status(now, self.freshness)
    }

    pub fn is_available(&self, node: &Node, now: DateTime<Utc>) -> bool {
        node.is_available(now, self.freshness)
    }

    /// Persist `offline` for every `online` node whose last contact falls
    /// outside the freshness window. Returns the ids that were flipped.
    pub async fn mark_stale_offline(&self, now: DateTime<Utc>) -> Result<Vec<NodeId>, NodeRegistryError> {
        let cutoff = now - self.freshness;
        let mut flipped = Vec::new();
        for node in self.repository.list_all().await? {
            if node.status != NodeStatus::Online || node.is_fresh(now, self.freshness) {
                continue;
            }
            // The listing may be outdated by a heartbeat; the repository re-checks.
            if self.repository.mark_offline_if_stale(&node.id, cutoff).await? {
                warn!(node_id = %node.id, last_contact = %node.last_contact, "Node is stale, marked offline");
                flipped.push(node.id);
            }
        }
        Ok(flipped)
    }

    pub async fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<(), NodeRegistryError> {
        match self.repository.set_status(id, status).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound(_)) => Err(NodeRegistryError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a successful contact initiated by the Controller.
    pub async fn touch(&self, id: &NodeId) -> Result<Node, NodeRegistryError> {
        match self.repository.touch(id, Utc::now()).await {
            Ok(node) => Ok(node),
            Err(RepositoryError::NotFound(_)) => Err(NodeRegistryError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NodeCapacity;
    use crate::infrastructure::repositories::InMemoryNodeRepository;
    use std::collections::BTreeSet;

    fn registry() -> NodeRegistry {
        NodeRegistry::new(
            Arc::new(InMemoryNodeRepository::new()),
            Arc::new(SharedSecretVerifier::new("agent-registration-key")),
            Duration::seconds(90),
        )
    }

    fn registration(id: &str, address: &str) -> NodeRegistration {
        NodeRegistration {
            node_id: NodeId::new(id),
            name: format!("{id}-name"),
            address: address.to_string(),
            tags: BTreeSet::from(["px4-agent".to_string()]),
            capacity: NodeCapacity { cpu_cores: 4, memory_gb: 8, disk_gb: 50 },
        }
    }

    #[test]
    fn test_shared_secret_verifier() {
        let verifier = SharedSecretVerifier::new("X7kQ9mR2vL5nP8wY3tH6");
        assert!(verifier.verify("X7kQ9mR2vL5nP8wY3tH6"));
        assert!(!verifier.verify("X7kQ9mR2vL5nP8wY3tH7"));
        assert!(!verifier.verify("short"));
        assert!(!verifier.verify(""));
    }

    #[tokio::test]
    async fn test_bad_credential_is_unauthorized_and_not_stored() {
        let reg = registry();
        let err = reg
            .register("wrong", registration("node-a", "10.0.0.1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(reg.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_updates_in_place() {
        let reg = registry();
        let first = reg
            .register("agent-registration-key", registration("node-a", "10.0.0.1"))
            .await
            .unwrap();
        reg.register("agent-registration-key", registration("node-b", "10.0.0.9"))
            .await
            .unwrap();
        let second = reg
            .register("agent-registration-key", registration("node-a", "10.0.0.2"))
            .await
            .unwrap();

        assert_eq!(second.address, "10.0.0.2");
        assert!(second.last_contact >= first.last_contact);
        assert_eq!(second.registered_at, first.registered_at);

        let ids: Vec<_> = reg.list().await.unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId::new("node-a"), NodeId::new("node-b")]);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let err = registry().get(&NodeId::new("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_stale_sweep_flips_only_stale_online_nodes() {
        let reg = registry();
        reg.register("agent-registration-key", registration("node-a", "10.0.0.1"))
            .await
            .unwrap();

        let soon = Utc::now() + Duration::seconds(10);
        assert!(reg.mark_stale_offline(soon).await.unwrap().is_empty());

        let later = Utc::now() + Duration::seconds(120);
        let flipped = reg.mark_stale_offline(later).await.unwrap();
        assert_eq!(flipped, vec![NodeId::new("node-a")]);
        assert_eq!(reg.get(&NodeId::new("node-a")).await.unwrap().status, NodeStatus::Offline);

        // registering again is the heartbeat that brings it back
        let node = reg
            .register("agent-registration-key", registration("node-a", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(node.status, NodeStatus::Online);
    }

    /// Delivers a heartbeat to the backing store while the sweep holds an
    /// older listing.
    struct HeartbeatDuringListing {
        inner: InMemoryNodeRepository,
        heartbeat: parking_lot::Mutex<Option<Node>>,
    }

    #[async_trait::async_trait]
    impl NodeRepository for HeartbeatDuringListing {
        async fn save(&self, node: &Node) -> Result<(), RepositoryError> {
            self.inner.save(node).await
        }

        async fn find_by_id(&self, id: &NodeId) -> Result<Option<Node>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
            let listing = self.inner.list_all().await?;
            let heartbeat = self.heartbeat.lock().take();
            if let Some(node) = heartbeat {
                self.inner.save(&node).await?;
            }
            Ok(listing)
        }

        async fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<(), RepositoryError> {
            self.inner.set_status(id, status).await
        }

        async fn mark_offline_if_stale(&self, id: &NodeId, cutoff: DateTime<Utc>) -> Result<bool, RepositoryError> {
            self.inner.mark_offline_if_stale(id, cutoff).await
        }

        async fn touch(&self, id: &NodeId, at: DateTime<Utc>) -> Result<Node, RepositoryError> {
            self.inner.touch(id, at).await
        }
    }

    #[tokio::test]
    async fn test_sweep_does_not_overwrite_concurrent_heartbeat() {
        let inner = InMemoryNodeRepository::new();
        let mut stale = Node::register(registration("node-a", "10.0.0.1"), Utc::now());
        stale.last_contact = Utc::now() - Duration::seconds(200);
        inner.save(&stale).await.unwrap();

        let fresh = Node::register(registration("node-a", "10.0.0.2"), Utc::now());
        let repo = Arc::new(HeartbeatDuringListing {
            inner: inner.clone(),
            heartbeat: parking_lot::Mutex::new(Some(fresh)),
        });
        let reg = NodeRegistry::new(
            repo,
            Arc::new(SharedSecretVerifier::new("agent-registration-key")),
            Duration::seconds(90),
        );

        let flipped = reg.mark_stale_offline(Utc::now()).await.unwrap();
        assert!(flipped.is_empty());

        let node = reg.get(&NodeId::new("node-a")).await.unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.address, "10.0.0.2");
        assert!(reg.is_available(&node, Utc::now()));
    }

    #[tokio::test]
    async fn test_touch_keeps_registered_attributes() {
        let reg = registry();
        reg.register("agent-registration-key", registration("node-a", "10.0.0.1"))
            .await
            .unwrap();
        reg.register("agent-registration-key", registration("node-a", "10.0.0.7"))
            .await
            .unwrap();

        let node = reg.touch(&NodeId::new("node-a")).await.unwrap();
        assert_eq!(node.address, "10.0.0.7");

        let err = reg.touch(&NodeId::new("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_set_status_and_touch() {
        let reg = registry();
        reg.register("agent-registration-key", registration("node-a", "10.0.0.1"))
            .await
            .unwrap();

        reg.set_status(&NodeId::new("node-a"), NodeStatus::Error).await.unwrap();
        let node = reg.get(&NodeId::new("node-a")).await.unwrap();
        assert!(!reg.is_available(&node, Utc::now()));

        let node = reg.touch(&NodeId::new("node-a")).await.unwrap();
        assert_eq!(node.status, NodeStatus::Online);

        let err = reg.set_status(&NodeId::new("ghost"), NodeStatus::Offline).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
