// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent HTTP API
//!
//! | Method | Path | Body | Answer |
//! |--------|------|------|--------|
//! | GET | `/health` | | `HealthReport` |
//! | GET | `/agent/status` | | `AgentStatusReport` |
//! | GET | `/agent/instances` | | `[InstanceDescriptor]` |
//! | POST | `/agent/start` | `StartInstanceRequest` | `InstanceDescriptor` |
//! | POST | `/agent/stop` | `StopRequest` | `StopAck` |
//!
//! Every handler delegates to the injected [`AgentService`]; the router holds
//! no state of its own.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::agent_service::AgentService;
use crate::domain::protocol::{
    AgentStatusReport, HealthReport, InstanceDescriptor, StartInstanceRequest, StopAck, StopRequest,
};
use crate::presentation::error::ApiError;

#[derive(Clone)]
pub struct AgentApiState {
    pub service: Arc<dyn AgentService>,
}

pub fn agent_router(service: Arc<dyn AgentService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/agent/status", get(status_handler))
        .route("/agent/instances", get(instances_handler))
        .route("/agent/start", post(start_handler))
        .route("/agent/stop", post(stop_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AgentApiState { service })
}

async fn health_handler(State(state): State<AgentApiState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy".to_string(),
        node_id: state.service.node_id().clone(),
        timestamp: Utc::now(),
    })
}

async fn status_handler(State(state): State<AgentApiState>) -> Result<Json<AgentStatusReport>, ApiError> {
    Ok(Json(state.service.status().await?))
}

async fn instances_handler(
    State(state): State<AgentApiState>,
) -> Result<Json<Vec<InstanceDescriptor>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

async fn start_handler(
    State(state): State<AgentApiState>,
    payload: Result<Json<StartInstanceRequest>, JsonRejection>,
) -> Result<Json<InstanceDescriptor>, ApiError> {
    let Json(request) = payload?;
    let spec = request.into_spec();
    spec.validate().map_err(|e| ApiError::invalid_request(e.to_string()))?;
    Ok(Json(state.service.start(spec).await?))
}

async fn stop_handler(
    State(state): State<AgentApiState>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<StopAck>, ApiError> {
    let Json(request) = payload?;
    let target = request
        .target()
        .ok_or_else(|| ApiError::invalid_request("Either container_id or instance_id is required"))?;
    Ok(Json(state.service.stop(target).await?))
}
