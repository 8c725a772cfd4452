// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! simfleet Rust SDK
//!
//! Typed client for the Controller API. Agents use it to register (and
//! re-register as a heartbeat); the `simfleet` CLI uses it for every
//! operator command.

pub mod client;
pub mod types;

pub use client::ControllerClient;
pub use types::*;
