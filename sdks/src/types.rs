// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

pub use simfleet_core::domain::error::ErrorKind;
pub use simfleet_core::domain::protocol::{
    ApiErrorBody, InstanceDescriptor, InstanceView, NodeView, ProbeReport, ReconcileReport, RegisterNodeRequest,
    RegisterNodeResponse, StartOnNodeRequest, StopAck, StopRequest,
};

#[derive(Debug, Error)]
pub enum SdkError {
    /// The Controller could not be reached or the connection broke.
    #[error("Controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Controller answered with a failure.
    #[error("Controller returned {status}: {message}")]
    Api {
        status: u16,
        kind: Option<ErrorKind>,
        remote_kind: Option<ErrorKind>,
        message: String,
    },

    #[error("Could not decode Controller response: {0}")]
    Decode(String),

    #[error("Invalid Controller URL '{0}'")]
    InvalidUrl(String),
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Http(_) => ErrorKind::Unreachable,
            SdkError::Api { kind: Some(kind), .. } => *kind,
            SdkError::Api { .. } => ErrorKind::AgentError,
            SdkError::Decode(_) => ErrorKind::ProtocolError,
            SdkError::InvalidUrl(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Kind the Agent reported when the Controller relayed its rejection.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            SdkError::Api { remote_kind, .. } => *remote_kind,
            _ => None,
        }
    }
}
