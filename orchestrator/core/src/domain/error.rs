// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stable Error Kinds
//!
//! Every failure produced by the fleet core maps onto one [`ErrorKind`].
//! Callers (HTTP clients, the CLI, the Controller relaying Agent failures)
//! branch on the kind; the accompanying message is for humans only.
//!
//! The kind is part of the wire contract: it is serialized in snake_case as
//! the `kind` field of every error body returned by the Agent and Controller
//! APIs.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown node or instance.
    NotFound,
    /// Registration credential rejected.
    Unauthorized,
    /// Port pool has no free port left.
    Exhausted,
    /// Requested port is held by another instance or outside the pool range.
    AlreadyInUse,
    /// Process launcher could not start the instance.
    LaunchFailed,
    /// Process launcher could not terminate the instance.
    StopFailed,
    /// Agent could not be reached (connect failure or timeout). Outcome unknown.
    Unreachable,
    /// Agent answered but rejected the call.
    AgentError,
    /// Agent answered with something that is not a valid response.
    ProtocolError,
    /// Target node is not online.
    NodeOffline,
    /// Requested lifecycle transition is not allowed from the current state.
    InvalidState,
    /// Malformed or contradictory request.
    InvalidRequest,
    /// Persistence collaborator failed.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::AlreadyInUse => "already_in_use",
            ErrorKind::LaunchFailed => "launch_failed",
            ErrorKind::StopFailed => "stop_failed",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::AgentError => "agent_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::NodeOffline => "node_offline",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
