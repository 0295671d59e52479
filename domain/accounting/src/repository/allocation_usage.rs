use async_trait::async_trait;
use uuid::Uuid;

use crate::model::entity::{AllocationUsage, AllocationUserUsage};

#[async_trait]
pub trait AllocationUsageRepo: Send + Sync {
    /// Insert or update the snapshot keyed by (allocation, year, month).
    ///
    /// Returns the stored row; an existing row keeps its id.
    async fn upsert_usage(&self, usage: &AllocationUsage) -> anyhow::Result<AllocationUsage>;

    /// Insert or update the row keyed by (allocation usage, username).
    async fn upsert_user_usage(&self, usage: &AllocationUserUsage) -> anyhow::Result<()>;

    async fn get_usage(
        &self,
        allocation_id: Uuid,
        year: i32,
        month: u32,
    ) -> anyhow::Result<Option<AllocationUsage>>;

    async fn get_user_usages(
        &self,
        allocation_usage_id: Uuid,
    ) -> anyhow::Result<Vec<AllocationUserUsage>>;
}
