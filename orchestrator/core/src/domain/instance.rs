// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Instance Aggregate
//!
//! One simulated-vehicle process managed by an Agent, and the lifecycle
//! state machine shared by the Agent's local registry and the Controller's
//! fleet-wide registry.
//!
//! ```text
//! starting ──► running ──► stopping ──► stopped
//!     │           │  └──────(exit observed)──►┘
//!     └───────────┴──────────┴──────► error
//! ```
//!
//! `stopped` and `error` are terminal for an [`InstanceId`]. A new start
//! always mints a new identifier; nothing revives an old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::ErrorKind;
use crate::domain::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Mint a fresh, never-before-used identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in container names and log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque launcher handle (container id, pid, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessHandle(pub String);

impl ProcessHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "starting" => Some(InstanceState::Starting),
            "running" => Some(InstanceState::Running),
            "stopping" => Some(InstanceState::Stopping),
            "stopped" => Some(InstanceState::Stopped),
            "error" => Some(InstanceState::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Stopped | InstanceState::Error)
    }

    pub fn can_transition_to(&self, next: InstanceState) -> bool {
        use InstanceState::*;
        match (*self, next) {
            (Starting, Running) | (Starting, Stopping) => true,
            (Running, Stopping) => true,
            (Stopping, Stopped) => true,
            // exit observed by a liveness probe
            (Starting, Stopped) | (Running, Stopped) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Instance {instance_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub instance_id: InstanceId,
    pub from: InstanceState,
    pub to: InstanceState,
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidState
    }
}

/// What a start request asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub model: String,
    pub vehicle_type: String,
    /// Caller-pinned UDP port; `None` lets the pool choose.
    pub mav_udp: Option<u16>,
}

/// A start request field that cannot be used as a container name or
/// build target component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {value:?} must be non-empty and contain only ASCII letters, digits, '-' or '_'")]
pub struct InvalidSpecField {
    pub field: &'static str,
    pub value: String,
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl InstanceSpec {
    /// `name` ends up in the container name and `model` in the build
    /// target, so both are restricted to `[A-Za-z0-9_-]+`.
    pub fn validate(&self) -> Result<(), InvalidSpecField> {
        for (field, value) in [
            ("name", &self.name),
            ("model", &self.model),
            ("vehicle_type", &self.vehicle_type),
        ] {
            if !is_identifier(value) {
                return Err(InvalidSpecField {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Which key a stop request resolves the instance by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopTarget {
    ByInstanceId(InstanceId),
    ByContainerId(ProcessHandle),
}

impl fmt::Display for StopTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopTarget::ByInstanceId(id) => write!(f, "instance {id}"),
            StopTarget::ByContainerId(handle) => write!(f, "container {handle}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub node_id: NodeId,
    pub process_handle: Option<ProcessHandle>,
    pub name: String,
    pub model: String,
    pub vehicle_type: String,
    pub mav_udp: Option<u16>,
    pub(crate) state: InstanceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// A new instance always begins in `starting`.
    pub fn new(id: InstanceId, node_id: NodeId, spec: &InstanceSpec, mav_udp: Option<u16>) -> Self {
        let now = Utc::now();
        Self {
            id,
            node_id,
            process_handle: None,
            name: spec.name.clone(),
            model: spec.model.clone(),
            vehicle_type: spec.vehicle_type.clone(),
            mav_udp,
            state: InstanceState::Starting,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transition(&mut self, to: InstanceState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                instance_id: self.id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Launch confirmed: attach the launcher handle and move to `running`.
    pub fn confirm_running(&mut self, handle: ProcessHandle) -> Result<(), TransitionError> {
        self.transition(InstanceState::Running)?;
        self.process_handle = Some(handle);
        Ok(())
    }

    pub fn matches(&self, target: &StopTarget) -> bool {
        match target {
            StopTarget::ByInstanceId(id) => &self.id == id,
            StopTarget::ByContainerId(handle) => self.process_handle.as_ref() == Some(handle),
        }
    }
}
