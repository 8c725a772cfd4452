// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP error mapping shared by the Agent and Controller routers.
//!
//! Every failure leaves the process as `{"kind": ..., "message": ...}` with a
//! status fixed by its [`ErrorKind`].

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::application::agent_service::AgentServiceError;
use crate::application::controller_service::ControllerError;
use crate::domain::error::ErrorKind;
use crate::domain::protocol::ApiErrorBody;

#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub remote_kind: Option<ErrorKind>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remote_kind: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn body(&self) -> ApiErrorBody {
        ApiErrorBody {
            kind: self.kind,
            message: self.message.clone(),
            remote_kind: self.remote_kind,
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Exhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::AlreadyInUse | ErrorKind::InvalidState | ErrorKind::NodeOffline => StatusCode::CONFLICT,
        ErrorKind::LaunchFailed | ErrorKind::StopFailed | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unreachable => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::AgentError | ErrorKind::ProtocolError => StatusCode::BAD_GATEWAY,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(self.kind), Json(self.body())).into_response()
    }
}

impl From<AgentServiceError> for ApiError {
    fn from(err: AgentServiceError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        let remote_kind = match &err {
            ControllerError::Rpc(rpc) => rpc.remote_kind(),
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            remote_kind,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}
