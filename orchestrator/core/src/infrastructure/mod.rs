// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Infrastructure Layer (`simfleet-core`)
//!
//! Adapters behind the domain and application ports.
//!
//! | Module | Implements | Backed by |
//! |--------|-----------|-----------|
//! | [`repositories`] | `NodeRepository`, `InstanceRepository` | memory, PostgreSQL |
//! | [`db`] | connection pool and embedded migrations | `sqlx` |
//! | [`docker_launcher`] | `InstanceLauncher` | Docker via `bollard` |
//! | [`host_probe`] | `HostProbe` | `sysinfo` |
//! | [`agent_client`] | `AgentRpc` | HTTP via `reqwest` |

pub mod repositories;
pub mod db;
pub mod docker_launcher;
pub mod host_probe;
pub mod agent_client;

pub use agent_client::HttpAgentClient;
pub use docker_launcher::DockerLauncher;
pub use host_probe::SysinfoHostProbe;
