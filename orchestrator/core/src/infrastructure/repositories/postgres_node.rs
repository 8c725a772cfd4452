// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Node Repository
//!
//! `NodeRepository` backed by the `nodes` table. Tags are stored as a native
//! `TEXT[]`; listing order follows the `seq` column, which an upsert never
//! rewrites, so a re-registered node keeps its original position.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::node::{Node, NodeCapacity, NodeId, NodeStatus};
use crate::domain::repository::{NodeRepository, RepositoryError};

pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn node_from_row(row: &PgRow) -> Result<Node, RepositoryError> {
        let status_str: String = row.get("status");
        let status = NodeStatus::parse(&status_str)
            .ok_or_else(|| RepositoryError::Serialization(format!("Unknown node status '{}'", status_str)))?;
        let tags: Vec<String> = row.get("tags");
        let capacity = NodeCapacity {
            cpu_cores: capacity_column(row, "cpu_cores")?,
            memory_gb: capacity_column(row, "memory_gb")?,
            disk_gb: capacity_column(row, "disk_gb")?,
        };
        let last_contact: DateTime<Utc> = row.get("last_contact");
        let registered_at: DateTime<Utc> = row.get("registered_at");

        Ok(Node {
            id: NodeId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            address: row.get("address"),
            tags: tags.into_iter().collect(),
            capacity,
            status,
            last_contact,
            registered_at,
        })
    }
}

fn capacity_column(row: &PgRow, column: &str) -> Result<u32, RepositoryError> {
    let value: i64 = row.get(column);
    u32::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("Node {} value {} out of range", column, value)))
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn save(&self, node: &Node) -> Result<(), RepositoryError> {
        let tags: Vec<String> = node.tags.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO nodes (
                id, name, address, tags, cpu_cores, memory_gb, disk_gb,
                status, last_contact, registered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                address = EXCLUDED.address,
                tags = EXCLUDED.tags,
                cpu_cores = EXCLUDED.cpu_cores,
                memory_gb = EXCLUDED.memory_gb,
                disk_gb = EXCLUDED.disk_gb,
                status = EXCLUDED.status,
                last_contact = EXCLUDED.last_contact
            "#,
        )
        .bind(node.id.as_str())
        .bind(&node.name)
        .bind(&node.address)
        .bind(&tags)
        .bind(i64::from(node.capacity.cpu_cores))
        .bind(i64::from(node.capacity.memory_gb))
        .bind(i64::from(node.capacity.disk_gb))
        .bind(node.status.as_str())
        .bind(node.last_contact)
        .bind(node.registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save node: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &NodeId) -> Result<Option<Node>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, address, tags, cpu_cores, memory_gb, disk_gb,
                   status, last_contact, registered_at
            FROM nodes
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::node_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, address, tags, cpu_cores, memory_gb, disk_gb,
                   status, last_contact, registered_at
            FROM nodes
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::node_from_row).collect()
    }

    async fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE nodes SET status = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("node {id}")));
        }
        Ok(())
    }

    async fn mark_offline_if_stale(&self, id: &NodeId, cutoff: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE nodes SET status = 'offline'
            WHERE id = $1 AND status = 'online' AND last_contact < $2
            "#,
        )
        .bind(id.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn touch(&self, id: &NodeId, at: DateTime<Utc>) -> Result<Node, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE nodes SET last_contact = $2, status = 'online'
            WHERE id = $1
            RETURNING id, name, address, tags, cpu_cores, memory_gb, disk_gb,
                      status, last_contact, registered_at
            "#,
        )
        .bind(id.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        match row {
            Some(row) => Self::node_from_row(&row),
            None => Err(RepositoryError::NotFound(format!("node {id}"))),
        }
    }
}
