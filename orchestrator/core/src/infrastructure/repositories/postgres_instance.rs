// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Instance Repository
//!
//! Fleet-wide `InstanceRepository` backed by the `instances` table.
//! `update` runs inside a transaction that locks the row with
//! `SELECT ... FOR UPDATE`, applies the mutation in memory and writes the
//! result back, so concurrent updates to one instance serialize in the
//! database while other rows stay unaffected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::instance::{Instance, InstanceId, InstanceState, ProcessHandle};
use crate::domain::node::NodeId;
use crate::domain::repository::{InstanceMutation, InstanceRepository, RepositoryError};

const COLUMNS: &str = "id, node_id, process_handle, name, model, vehicle_type, mav_udp, state, created_at, updated_at";

pub struct PostgresInstanceRepository {
    pool: PgPool,
}

impl PostgresInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn instance_from_row(row: &PgRow) -> Result<Instance, RepositoryError> {
        let state_str: String = row.get("state");
        let state = InstanceState::parse(&state_str)
            .ok_or_else(|| RepositoryError::Serialization(format!("Unknown instance state '{}'", state_str)))?;
        let mav_udp: Option<i32> = row.get("mav_udp");
        let mav_udp = mav_udp
            .map(u16::try_from)
            .transpose()
            .map_err(|e| RepositoryError::Serialization(format!("Invalid mav_udp port: {}", e)))?;
        let process_handle: Option<String> = row.get("process_handle");
        let created_at: DateTime<Utc> = row.get("created_at");
        let updated_at: DateTime<Utc> = row.get("updated_at");

        Ok(Instance {
            id: InstanceId::new(row.get::<String, _>("id")),
            node_id: NodeId::new(row.get::<String, _>("node_id")),
            process_handle: process_handle.map(ProcessHandle::new),
            name: row.get("name"),
            model: row.get("model"),
            vehicle_type: row.get("vehicle_type"),
            mav_udp,
            state,
            created_at,
            updated_at,
        })
    }

    fn map_insert_error(instance: &Instance, err: sqlx::Error) -> RepositoryError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepositoryError::AlreadyExists(format!("instance {}", instance.id));
            }
            if db_err.is_foreign_key_violation() {
                return RepositoryError::NotFound(format!("node {}", instance.node_id));
            }
        }
        RepositoryError::Database(format!("Failed to insert instance: {}", err))
    }
}

#[async_trait]
impl InstanceRepository for PostgresInstanceRepository {
    async fn insert(&self, instance: &Instance) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO instances (
                id, node_id, process_handle, name, model, vehicle_type,
                mav_udp, state, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(instance.id.as_str())
        .bind(instance.node_id.as_str())
        .bind(instance.process_handle.as_ref().map(|h| h.as_str()))
        .bind(&instance.name)
        .bind(&instance.model)
        .bind(&instance.vehicle_type)
        .bind(instance.mav_udp.map(i32::from))
        .bind(instance.state().as_str())
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_insert_error(instance, e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<Instance>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM instances WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::instance_from_row).transpose()
    }

    async fn find_by_handle(&self, handle: &ProcessHandle) -> Result<Option<Instance>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM instances WHERE process_handle = $1 ORDER BY seq ASC LIMIT 1"
        ))
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::instance_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM instances ORDER BY seq ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::instance_from_row).collect()
    }

    async fn list_by_node(&self, node_id: &NodeId) -> Result<Vec<Instance>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM instances WHERE node_id = $1 ORDER BY seq ASC"
        ))
        .bind(node_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::instance_from_row).collect()
    }

    async fn update(&self, id: &InstanceId, mutation: InstanceMutation) -> Result<Instance, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM instances WHERE id = $1 FOR UPDATE"))
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?
            .ok_or_else(|| RepositoryError::NotFound(format!("instance {id}")))?;

        let mut instance = Self::instance_from_row(&row)?;
        // dropping `tx` on error rolls back and releases the row lock
        mutation(&mut instance)?;

        sqlx::query(
            r#"
            UPDATE instances
            SET process_handle = $2, mav_udp = $3, state = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(instance.id.as_str())
        .bind(instance.process_handle.as_ref().map(|h| h.as_str()))
        .bind(instance.mav_udp.map(i32::from))
        .bind(instance.state().as_str())
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update instance: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(instance)
    }

    async fn remove(&self, id: &InstanceId) -> Result<Option<Instance>, RepositoryError> {
        let row = sqlx::query(&format!("DELETE FROM instances WHERE id = $1 RETURNING {COLUMNS}"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::instance_from_row).transpose()
    }
}
