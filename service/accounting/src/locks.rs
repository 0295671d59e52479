use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// In-process locks serializing work on one allocation.
#[derive(Debug, Default)]
pub struct AllocationLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AllocationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task works on `allocation_id`.
    pub async fn lock(&self, allocation_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(allocation_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the lock of a removed allocation once no other task holds or awaits it.
    pub fn forget(&self, allocation_id: Uuid) {
        self.locks
            .remove_if(&allocation_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
