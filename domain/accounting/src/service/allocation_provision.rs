use async_trait::async_trait;
use uuid::Uuid;

use crate::exception::AccountingResult;
use crate::model::vo::ResourceLimits;

/// Drives an allocation through its lifecycle on the cluster.
#[async_trait]
pub trait AllocationProvisionService: Send + Sync {
    /// Create the cluster account of a scheduled allocation.
    async fn create_allocation(&self, allocation_id: Uuid) -> AccountingResult<()>;

    async fn update_limits(
        &self,
        allocation_id: Uuid,
        limits: ResourceLimits,
    ) -> AccountingResult<()>;

    /// Remove the cluster account and the local record.
    async fn delete_allocation(&self, allocation_id: Uuid) -> AccountingResult<()>;

    /// Grant `username` access to the allocation.
    async fn add_association(&self, allocation_id: Uuid, username: &str) -> AccountingResult<()>;

    /// Revoke access of `username` to the allocation.
    async fn remove_association(&self, allocation_id: Uuid, username: &str)
        -> AccountingResult<()>;

    /// Mark the allocation erred with `message`.
    async fn set_erred(&self, allocation_id: Uuid, message: &str) -> AccountingResult<()>;
}
