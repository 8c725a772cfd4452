// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # simfleet-core
//!
//! Coordination core for a fleet of PX4 simulation hosts. Each host runs an
//! Agent that owns a UDP port pool and launches simulated vehicles; a
//! central Controller keeps the node registry and the fleet-wide instance
//! registry and drives Agents over HTTP.
//!
//! # Architecture
//!
//! - **domain** - identifiers, state machines, port pool, repository and launcher ports
//! - **application** - Agent Core, Node Registry, Controller Core
//! - **infrastructure** - repositories, Docker launcher, host probe, Agent RPC client
//! - **presentation** - axum routers for both APIs

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
