// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on the storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select in-memory or PostgreSQL repositories for the Controller

use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repository::{InstanceRepository, NodeRepository, RepositoryError, StorageBackend};
use crate::infrastructure::repositories::postgres_instance::PostgresInstanceRepository;
use crate::infrastructure::repositories::postgres_node::PostgresNodeRepository;
use crate::infrastructure::repositories::{InMemoryInstanceRepository, InMemoryNodeRepository};

fn require_pool(backend: &StorageBackend, pool: Option<PgPool>) -> Result<PgPool, RepositoryError> {
    pool.ok_or_else(|| {
        RepositoryError::Database(format!("{backend:?} backend selected but no connection pool was provided"))
    })
}

/// Creates a NodeRepository implementation based on the configured backend
pub fn create_node_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn NodeRepository>, RepositoryError> {
    Ok(match backend {
        StorageBackend::InMemory => Arc::new(InMemoryNodeRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresNodeRepository::new(require_pool(backend, pool)?)),
    })
}

/// Creates an InstanceRepository implementation based on the configured backend
pub fn create_instance_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn InstanceRepository>, RepositoryError> {
    Ok(match backend {
        StorageBackend::InMemory => Arc::new(InMemoryInstanceRepository::new()),
        StorageBackend::PostgreSQL(_) => Arc::new(PostgresInstanceRepository::new(require_pool(backend, pool)?)),
    })
}
