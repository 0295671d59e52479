use async_trait::async_trait;
use uuid::Uuid;

use super::DBRepository;
use crate::model::entity::Allocation;

#[async_trait]
pub trait AllocationRepo: DBRepository<Allocation> + Send + Sync {
    /// Allocations that have a non-empty `backend_id`.
    async fn get_provisioned(&self) -> anyhow::Result<Vec<Allocation>>;

    async fn get_by_project(&self, project_id: Uuid) -> anyhow::Result<Vec<Allocation>>;
}
