// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! simfleet CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Daemon wiring for the Agent and Controller roles, and the
//!   operator commands that talk to a running Controller

pub mod commands;
pub mod daemon;
