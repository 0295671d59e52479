use async_trait::async_trait;
use uuid::Uuid;

use crate::exception::AccountingResult;
use crate::model::entity::Allocation;
use crate::model::vo::AccountUsage;

/// Usernames added and removed locally by an association pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationChanges {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

impl AssociationChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Outcome of a bulk usage sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub updated: Vec<Uuid>,
    /// Reported accounts with no local allocation.
    pub skipped: Vec<String>,
}

/// Pulls remote accounting state into local records.
#[async_trait]
pub trait AllocationSyncService: Send + Sync {
    /// Refresh usage, limits and associations of one allocation.
    async fn pull_allocation(&self, allocation_id: Uuid) -> AccountingResult<()>;

    /// Refresh usage of every provisioned allocation with a single report.
    async fn sync_usage(&self) -> AccountingResult<SyncSummary>;

    /// Make local associations of `allocation` mirror the cluster.
    async fn sync_associations(&self, allocation: &Allocation)
        -> AccountingResult<AssociationChanges>;

    /// Write `usage` into the allocation counters and the monthly snapshots,
    /// propagating to the quota scopes when the counters changed.
    ///
    /// Returns whether the counters changed. Nothing is committed.
    async fn update_quotas(
        &self,
        allocation: &mut Allocation,
        usage: &AccountUsage,
    ) -> AccountingResult<bool>;
}
