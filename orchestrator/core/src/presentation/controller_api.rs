// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Controller HTTP API
//!
//! | Method | Path | Answer |
//! |--------|------|--------|
//! | GET | `/health` | liveness |
//! | POST | `/api/v1/register` | `RegisterNodeResponse` |
//! | GET | `/api/v1/nodes` | `[NodeView]` |
//! | GET | `/api/v1/nodes/{node_id}` | `NodeView` |
//! | POST | `/api/v1/nodes/{node_id}/start` | `InstanceDescriptor` |
//! | POST | `/api/v1/nodes/{node_id}/stop` | `StopAck` |
//! | POST | `/api/v1/nodes/{node_id}/reconcile` | `ReconcileReport` |
//! | POST | `/api/v1/nodes/{node_id}/probe` | `ProbeReport` |
//! | GET | `/api/v1/instances` | `[InstanceView]` |
//! | GET | `/api/v1/instances/{instance_id}` | `InstanceView` |
//! | POST | `/api/v1/instances/{instance_id}/stop` | `StopAck` |
//!
//! Reads never contact Agents; only start, stop, reconcile and probe do.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::controller_service::ControllerService;
use crate::domain::instance::{InstanceId, StopTarget};
use crate::domain::node::NodeId;
use crate::domain::protocol::{
    InstanceDescriptor, InstanceView, NodeView, ProbeReport, ReconcileReport, RegisterNodeRequest,
    RegisterNodeResponse, StartOnNodeRequest, StopAck, StopRequest,
};
use crate::presentation::error::ApiError;

#[derive(Clone)]
pub struct ControllerApiState {
    pub service: Arc<dyn ControllerService>,
}

pub fn controller_router(service: Arc<dyn ControllerService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/register", post(register_handler))
        .route("/api/v1/nodes", get(list_nodes_handler))
        .route("/api/v1/nodes/{node_id}", get(get_node_handler))
        .route("/api/v1/nodes/{node_id}/start", post(start_on_node_handler))
        .route("/api/v1/nodes/{node_id}/stop", post(stop_on_node_handler))
        .route("/api/v1/nodes/{node_id}/reconcile", post(reconcile_handler))
        .route("/api/v1/nodes/{node_id}/probe", post(probe_handler))
        .route("/api/v1/instances", get(list_instances_handler))
        .route("/api/v1/instances/{instance_id}", get(get_instance_handler))
        .route("/api/v1/instances/{instance_id}/stop", post(stop_instance_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ControllerApiState { service })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn register_handler(
    State(state): State<ControllerApiState>,
    payload: Result<Json<RegisterNodeRequest>, JsonRejection>,
) -> Result<Json<RegisterNodeResponse>, ApiError> {
    let Json(request) = payload?;
    if request.node_id.as_str().trim().is_empty() {
        return Err(ApiError::invalid_request("node_id must not be empty"));
    }
    let (credential, registration) = request.into_parts();
    let node = state.service.register_node(&credential, registration).await?;
    Ok(Json(RegisterNodeResponse {
        status: "registered".to_string(),
        node_id: node.id,
    }))
}

async fn list_nodes_handler(State(state): State<ControllerApiState>) -> Result<Json<Vec<NodeView>>, ApiError> {
    Ok(Json(state.service.list_nodes().await?))
}

async fn get_node_handler(
    State(state): State<ControllerApiState>,
    Path(node_id): Path<String>,
) -> Result<Json<NodeView>, ApiError> {
    Ok(Json(state.service.get_node(&NodeId::new(node_id)).await?))
}

async fn start_on_node_handler(
    State(state): State<ControllerApiState>,
    Path(node_id): Path<String>,
    payload: Result<Json<StartOnNodeRequest>, JsonRejection>,
) -> Result<Json<InstanceDescriptor>, ApiError> {
    let Json(request) = payload?;
    let spec = request.into_spec();
    spec.validate().map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let instance = state.service.start_instance(&NodeId::new(node_id), spec).await?;
    Ok(Json(InstanceDescriptor::from(&instance)))
}

async fn stop_on_node_handler(
    State(state): State<ControllerApiState>,
    Path(node_id): Path<String>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<StopAck>, ApiError> {
    let Json(request) = payload?;
    let target = request
        .target()
        .ok_or_else(|| ApiError::invalid_request("Either container_id or instance_id is required"))?;
    Ok(Json(state.service.stop_on_node(&NodeId::new(node_id), target).await?))
}

async fn reconcile_handler(
    State(state): State<ControllerApiState>,
    Path(node_id): Path<String>,
) -> Result<Json<ReconcileReport>, ApiError> {
    Ok(Json(state.service.reconcile_node(&NodeId::new(node_id)).await?))
}

async fn probe_handler(
    State(state): State<ControllerApiState>,
    Path(node_id): Path<String>,
) -> Result<Json<ProbeReport>, ApiError> {
    Ok(Json(state.service.probe_node(&NodeId::new(node_id)).await?))
}

async fn list_instances_handler(
    State(state): State<ControllerApiState>,
) -> Result<Json<Vec<InstanceView>>, ApiError> {
    let instances = state.service.list_instances().await?;
    Ok(Json(instances.into_iter().map(InstanceView::from).collect()))
}

async fn get_instance_handler(
    State(state): State<ControllerApiState>,
    Path(instance_id): Path<String>,
) -> Result<Json<InstanceView>, ApiError> {
    let instance = state.service.get_instance(&InstanceId::new(instance_id)).await?;
    Ok(Json(InstanceView::from(instance)))
}

async fn stop_instance_handler(
    State(state): State<ControllerApiState>,
    Path(instance_id): Path<String>,
) -> Result<Json<StopAck>, ApiError> {
    let target = StopTarget::ByInstanceId(InstanceId::new(instance_id));
    Ok(Json(state.service.stop_instance(target).await?))
}
