// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod instance_locks;
pub mod agent_service;
pub mod node_registry;
pub mod agent_rpc;
pub mod controller_service;
pub mod repository_factory;

// Re-export services for convenience
pub use agent_service::{AgentService, AgentServiceError, ShutdownReport, StandardAgentService};
pub use agent_rpc::{AgentRpc, RpcError};
pub use controller_service::{ControllerError, ControllerService, StandardControllerService};
pub use node_registry::{CredentialVerifier, NodeRegistry, NodeRegistryError, SharedSecretVerifier};
