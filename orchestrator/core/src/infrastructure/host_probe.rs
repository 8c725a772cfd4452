// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host capacity probe backed by `sysinfo`.
//!
//! Reads CPU count, total memory and the size of the root filesystem. The
//! reading runs on the blocking pool since `sysinfo` touches procfs.

use async_trait::async_trait;
use std::path::Path;
use sysinfo::{Disks, System};
use tracing::warn;

use crate::domain::launcher::{HostProbe, HostResources};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoHostProbe;

impl SysinfoHostProbe {
    pub fn new() -> Self {
        Self
    }

    pub fn read() -> HostResources {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| d.total_space());
        let disk_bytes = root.unwrap_or_else(|| disks.list().iter().map(|d| d.total_space()).sum());

        HostResources {
            cpu_cores: sys.cpus().len() as u32,
            memory_gb: to_gib(sys.total_memory()),
            disk_gb: to_gib(disk_bytes),
        }
    }
}

fn to_gib(bytes: u64) -> u32 {
    (bytes / GIB).min(u32::MAX as u64) as u32
}

#[async_trait]
impl HostProbe for SysinfoHostProbe {
    async fn resources(&self) -> HostResources {
        match tokio::task::spawn_blocking(Self::read).await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "Host probe task failed, reporting zero capacity");
                HostResources::default()
            }
        }
    }
}
