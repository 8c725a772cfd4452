// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`simfleet-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. **No business logic lives here**; all real work is delegated to
//! the services in `crate::application`.
//!
//! | Module | Served by | Description |
//! |--------|-----------|-------------|
//! | [`agent_api`] | `simfleet agent` | per-host instance lifecycle |
//! | [`controller_api`] | `simfleet controller` | fleet registry and node-targeted operations |
//! | [`error`] | both | `ErrorKind` to HTTP status mapping |

pub mod agent_api;
pub mod controller_api;
pub mod error;

pub use agent_api::agent_router;
pub use controller_api::controller_router;
pub use error::ApiError;
