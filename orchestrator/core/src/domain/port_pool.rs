// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Port Allocation Pool
//!
//! Per-Agent pool of UDP ports handed to simulated-vehicle instances. The
//! pool only tracks logical ownership; it never binds sockets. The launcher
//! is told which port to bind.
//!
//! # Invariants
//!
//! - Every port of the configured inclusive range sits in exactly one of
//!   `used` / `available`, so `used + available == range size` always holds.
//! - A port in `used` is never handed out again until released.
//! - `release` is idempotent and tolerates ports the pool never managed, so
//!   error-unwinding paths may release unconditionally.
//! - Explicitly requested ports outside the range are rejected rather than
//!   silently accepted: instances share host networking and an untracked
//!   port could collide with a pooled one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::error::ErrorKind;

/// Inclusive `[start, end]` port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, PortError> {
        if start > end {
            return Err(PortError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self { start: 14560, end: 14570 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("Port pool {start}-{end} is exhausted")]
    Exhausted { start: u16, end: u16 },
    #[error("Port {0} is already in use")]
    AlreadyInUse(u16),
    #[error("Port {port} is outside the managed range {start}-{end}")]
    OutOfRange { port: u16, start: u16, end: u16 },
    #[error("Invalid port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },
}

impl PortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortError::Exhausted { .. } => ErrorKind::Exhausted,
            // An out-of-range request is a policy rejection of the same
            // shape as a collision: the caller must pick another port.
            PortError::AlreadyInUse(_) | PortError::OutOfRange { .. } => ErrorKind::AlreadyInUse,
            PortError::InvalidRange { .. } => ErrorKind::InvalidRequest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortPool {
    range: PortRange,
    available: BTreeSet<u16>,
    used: BTreeSet<u16>,
}

impl PortPool {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            available: (range.start..=range.end).collect(),
            used: BTreeSet::new(),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Claim the lowest-numbered free port.
    pub fn allocate(&mut self) -> Result<u16, PortError> {
        let port = self.available.pop_first().ok_or(PortError::Exhausted {
            start: self.range.start,
            end: self.range.end,
        })?;
        self.used.insert(port);
        Ok(port)
    }

    /// Claim a caller-pinned port.
    pub fn allocate_explicit(&mut self, port: u16) -> Result<u16, PortError> {
        if !self.range.contains(port) {
            return Err(PortError::OutOfRange {
                port,
                start: self.range.start,
                end: self.range.end,
            });
        }
        if !self.available.remove(&port) {
            return Err(PortError::AlreadyInUse(port));
        }
        self.used.insert(port);
        Ok(port)
    }

    /// Claim `requested` if given, otherwise the lowest free port.
    pub fn acquire(&mut self, requested: Option<u16>) -> Result<u16, PortError> {
        match requested {
            Some(port) => self.allocate_explicit(port),
            None => self.allocate(),
        }
    }

    /// Return a port to the pool. Releasing a free or foreign port is a no-op.
    pub fn release(&mut self, port: u16) {
        if self.used.remove(&port) {
            self.available.insert(port);
        }
    }

    pub fn is_used(&self, port: u16) -> bool {
        self.used.contains(&port)
    }

    pub fn available_ports(&self) -> Vec<u16> {
        self.available.iter().copied().collect()
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }
}
