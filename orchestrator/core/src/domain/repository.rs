// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the two aggregates of the fleet core, following
//! the DDD Repository pattern: interface defined in the domain layer,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `NodeRepository` | `Node` | `InMemoryNodeRepository`, `PostgresNodeRepository` |
//! | `InstanceRepository` | `Instance` | `InMemoryInstanceRepository`, `PostgresInstanceRepository` |
//!
//! `InstanceRepository` serves both sides: each Agent keeps a local
//! in-memory registry of the instances on its host, and the Controller keeps
//! the fleet-wide registry in whichever backend is configured.
//!
//! ## Ordering
//!
//! `list_*` operations return records in insertion order and that order is
//! stable across calls, so callers can paginate deterministically.
//!
//! ## Atomic updates
//!
//! [`InstanceRepository::update`] is a single read-modify-write per
//! instance identifier. Concurrent updates to the same record serialize;
//! updates to different records do not contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::error::ErrorKind;
use crate::domain::instance::{Instance, InstanceId, ProcessHandle, TransitionError};
use crate::domain::node::{Node, NodeId, NodeStatus};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Mutation applied inside [`InstanceRepository::update`].
pub type InstanceMutation = Box<dyn FnOnce(&mut Instance) -> Result<(), TransitionError> + Send>;

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Save node (create or update). Updating keeps the original position.
    async fn save(&self, node: &Node) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &NodeId) -> Result<Option<Node>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError>;

    /// Set the status of a known node; `NotFound` otherwise.
    async fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<(), RepositoryError>;

    /// Conditionally flip a node to `offline`: only while it is still
    /// `online` with a last contact older than `cutoff`. The check and the
    /// write are one atomic step, so a heartbeat that lands first wins.
    /// Returns whether the node was flipped.
    async fn mark_offline_if_stale(&self, id: &NodeId, cutoff: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Record contact at `at` and set `online`, leaving every other
    /// attribute as stored. `NotFound` for unknown ids.
    async fn touch(&self, id: &NodeId, at: DateTime<Utc>) -> Result<Node, RepositoryError>;
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Insert a new record. Identifiers are never reused, so an existing id
    /// is rejected with `AlreadyExists`.
    async fn insert(&self, instance: &Instance) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<Instance>, RepositoryError>;

    async fn find_by_handle(&self, handle: &ProcessHandle) -> Result<Option<Instance>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Instance>, RepositoryError>;

    async fn list_by_node(&self, node_id: &NodeId) -> Result<Vec<Instance>, RepositoryError>;

    /// Atomically apply `mutation` to the stored record and persist the
    /// result. If the mutation fails nothing is written.
    async fn update(&self, id: &InstanceId, mutation: InstanceMutation) -> Result<Instance, RepositoryError>;

    /// Remove and return the record, if any.
    async fn remove(&self, id: &InstanceId) -> Result<Option<Instance>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::AlreadyExists(_) => ErrorKind::InvalidState,
            RepositoryError::Transition(e) => e.kind(),
            RepositoryError::Database(_) | RepositoryError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
