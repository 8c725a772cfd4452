// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve nodes and instances
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresNodeRepository** - `nodes` table, tags as a native `TEXT[]`
//! - **PostgresInstanceRepository** - `instances` table, `SELECT ... FOR UPDATE` updates
//!
//! ## In-Memory Repositories
//!
//! - **InMemoryNodeRepository** - default Controller backend
//! - **InMemoryInstanceRepository** - every Agent's local registry, and the
//!   default Controller backend
//!
//! Both keep insertion order so listings are stable across calls.

pub mod postgres_node;
pub mod postgres_instance;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::instance::{Instance, InstanceId, ProcessHandle};
use crate::domain::node::{Node, NodeId, NodeStatus};
use crate::domain::repository::{InstanceMutation, InstanceRepository, NodeRepository, RepositoryError};

/// Map plus insertion order.
struct Ordered<K, V> {
    items: HashMap<K, V>,
    order: Vec<K>,
}

impl<K: Clone + Eq + std::hash::Hash, V: Clone> Ordered<K, V> {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        self.order.iter().filter_map(|k| self.items.get(k))
    }

    fn upsert(&mut self, key: K, value: V) {
        if self.items.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.items.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

#[derive(Clone)]
pub struct InMemoryNodeRepository {
    nodes: Arc<RwLock<Ordered<NodeId, Node>>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(Ordered::new())),
        }
    }
}

impl Default for InMemoryNodeRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn save(&self, node: &Node) -> Result<(), RepositoryError> {
        self.nodes.write().upsert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &NodeId) -> Result<Option<Node>, RepositoryError> {
        Ok(self.nodes.read().items.get(id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        Ok(self.nodes.read().values().cloned().collect())
    }

    async fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<(), RepositoryError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .items
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("node {id}")))?;
        node.status = status;
        Ok(())
    }

    async fn mark_offline_if_stale(&self, id: &NodeId, cutoff: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut nodes = self.nodes.write();
        match nodes.items.get_mut(id) {
            Some(node) if node.status == NodeStatus::Online && node.last_contact < cutoff => {
                node.status = NodeStatus::Offline;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch(&self, id: &NodeId, at: DateTime<Utc>) -> Result<Node, RepositoryError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .items
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("node {id}")))?;
        node.touch(at);
        Ok(node.clone())
    }
}

#[derive(Clone)]
pub struct InMemoryInstanceRepository {
    instances: Arc<RwLock<Ordered<InstanceId, Instance>>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(Ordered::new())),
        }
    }
}

impl Default for InMemoryInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn insert(&self, instance: &Instance) -> Result<(), RepositoryError> {
        let mut instances = self.instances.write();
        if instances.items.contains_key(&instance.id) {
            return Err(RepositoryError::AlreadyExists(format!("instance {}", instance.id)));
        }
        instances.upsert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<Instance>, RepositoryError> {
        Ok(self.instances.read().items.get(id).cloned())
    }

    async fn find_by_handle(&self, handle: &ProcessHandle) -> Result<Option<Instance>, RepositoryError> {
        Ok(self
            .instances
            .read()
            .values()
            .find(|i| i.process_handle.as_ref() == Some(handle))
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self.instances.read().values().cloned().collect())
    }

    async fn list_by_node(&self, node_id: &NodeId) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|i| &i.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: &InstanceId, mutation: InstanceMutation) -> Result<Instance, RepositoryError> {
        let mut instances = self.instances.write();
        let stored = instances
            .items
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("instance {id}")))?;
        let mut draft = stored.clone();
        mutation(&mut draft)?;
        *stored = draft.clone();
        Ok(draft)
    }

    async fn remove(&self, id: &InstanceId) -> Result<Option<Instance>, RepositoryError> {
        Ok(self.instances.write().remove(id))
    }
}
