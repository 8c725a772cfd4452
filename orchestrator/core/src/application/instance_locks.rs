// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::instance::InstanceId;

/// Per-instance async mutexes. Operations that span an await point (an RPC
/// or a launcher call) between reading and writing an instance record hold
/// the guard for that identifier; different instances never contend.
#[derive(Default)]
pub struct InstanceLocks {
    locks: DashMap<InstanceId, Arc<Mutex<()>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &InstanceId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let lock = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the entry for a record that no longer exists. Callers re-read
    /// the record after acquiring, so a waiter on the old mutex still
    /// observes the removal.
    pub fn forget(&self, id: &InstanceId) {
        self.locks.remove(id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_instance_serializes() {
        let locks = Arc::new(InstanceLocks::new());
        let id = InstanceId::new("i-1");

        let guard = locks.acquire(&id).await;
        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_instances_do_not_contend() {
        let locks = InstanceLocks::new();
        let _a = locks.acquire(&InstanceId::new("a")).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&InstanceId::new("b"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);

        locks.forget(&InstanceId::new("a"));
        assert_eq!(locks.len(), 1);
    }
}
