// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the simfleet CLI

pub mod config;
pub mod db;
pub mod instance;
pub mod node;
pub mod render;

pub use self::config::ConfigCommand;
pub use self::db::DbCommand;
pub use self::instance::InstanceCommand;
pub use self::node::NodeCommand;
