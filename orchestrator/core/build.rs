// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Build Script for simfleet-core
//!
//! The PostgreSQL schema in `migrations/` is embedded with
//! `sqlx::migrate!`, which only re-reads the directory when the crate is
//! rebuilt. Tell Cargo to rebuild whenever a migration is added or edited.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
