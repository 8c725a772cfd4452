// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::error::ErrorKind;
use crate::domain::instance::{InstanceId, ProcessHandle};

/// Everything the launcher needs to bring up one simulated vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub instance_id: InstanceId,
    pub name: String,
    pub model: String,
    pub vehicle_type: String,
    /// UDP port the vehicle must bind; already reserved in the pool.
    pub udp_port: u16,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn env_vars(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("Failed to launch instance: {0}")]
    LaunchFailed(String),
    #[error("Failed to terminate instance: {0}")]
    TerminationFailed(String),
    #[error("Launcher unavailable: {0}")]
    Unavailable(String),
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::LaunchFailed(_) | LauncherError::Unavailable(_) => ErrorKind::LaunchFailed,
            LauncherError::TerminationFailed(_) => ErrorKind::StopFailed,
        }
    }
}

/// Opaque process-launching capability used by the Agent Core.
#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, LauncherError>;

    /// Stop the process, waiting at most `grace` before killing it. A handle
    /// that no longer resolves counts as already terminated.
    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<(), LauncherError>;

    /// `Ok(false)` only when the handle definitively no longer resolves to a
    /// live process; probe failures are reported as errors.
    async fn is_alive(&self, handle: &ProcessHandle) -> Result<bool, LauncherError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResources {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
}

/// Host capacity reporting. Values feed registration and status only.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn resources(&self) -> HostResources;
}

/// Fixed capacity, used when the operator declares resources in config.
pub struct StaticHostProbe(pub HostResources);

#[async_trait]
impl HostProbe for StaticHostProbe {
    async fn resources(&self) -> HostResources {
        self.0
    }
}
