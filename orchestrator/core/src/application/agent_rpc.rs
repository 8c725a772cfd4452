// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent RPC port used by the Controller.
//!
//! Every call either yields the Agent's typed answer or one of three
//! failures. Implementations never retry: a retried `start` could launch a
//! second instance, and only the caller can decide whether that is safe.
//!
//! | Failure | Meaning |
//! |---------|---------|
//! | `Unreachable` | connect failure or timeout; the outcome on the Agent is unknown |
//! | `AgentError` | the Agent answered and rejected the call |
//! | `ProtocolError` | the Agent answered with something undecodable |

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::error::ErrorKind;
use crate::domain::node::{Node, NodeId};
use crate::domain::protocol::{
    AgentStatusReport, ApiErrorBody, InstanceDescriptor, StartInstanceRequest, StopAck, StopRequest,
};

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("Agent on node {node_id} unreachable: {reason}")]
    Unreachable { node_id: NodeId, reason: String },

    #[error("Agent on node {node_id} rejected the call with status {status}: {body}")]
    AgentError { node_id: NodeId, status: u16, body: String },

    #[error("Malformed response from agent on node {node_id}: {reason}")]
    ProtocolError { node_id: NodeId, reason: String },
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Unreachable { .. } => ErrorKind::Unreachable,
            RpcError::AgentError { .. } => ErrorKind::AgentError,
            RpcError::ProtocolError { .. } => ErrorKind::ProtocolError,
        }
    }

    /// The kind the Agent reported, when an `AgentError` body is a standard
    /// error body.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            RpcError::AgentError { body, .. } => serde_json::from_str::<ApiErrorBody>(body)
                .ok()
                .map(|b| b.kind),
            _ => None,
        }
    }
}

#[async_trait]
pub trait AgentRpc: Send + Sync {
    async fn start(&self, node: &Node, request: &StartInstanceRequest) -> Result<InstanceDescriptor, RpcError>;

    async fn stop(&self, node: &Node, request: &StopRequest) -> Result<StopAck, RpcError>;

    async fn status(&self, node: &Node) -> Result<AgentStatusReport, RpcError>;

    async fn instances(&self, node: &Node) -> Result<Vec<InstanceDescriptor>, RpcError>;

    /// `Ok(false)` when the Agent answered but does not report itself healthy.
    async fn health(&self, node: &Node) -> Result<bool, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_kind_parsed_from_error_body() {
        let err = RpcError::AgentError {
            node_id: NodeId::new("n1"),
            status: 409,
            body: r#"{"kind":"already_in_use","message":"Port 14560 is already in use"}"#.to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::AgentError);
        assert_eq!(err.remote_kind(), Some(ErrorKind::AlreadyInUse));

        let opaque = RpcError::AgentError {
            node_id: NodeId::new("n1"),
            status: 500,
            body: "Internal Server Error".to_string(),
        };
        assert_eq!(opaque.remote_kind(), None);
    }
}
