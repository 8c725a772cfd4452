// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: aggregates, value objects and the ports the application
//! layer is written against. No I/O happens here.

pub mod error;
pub mod port_pool;
pub mod instance;
pub mod node;
pub mod launcher;
pub mod repository;
pub mod protocol;
pub mod node_config;
