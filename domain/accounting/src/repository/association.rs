use async_trait::async_trait;
use uuid::Uuid;

use super::DBRepository;
use crate::model::entity::Association;

#[async_trait]
pub trait AssociationRepo: DBRepository<Association> + Send + Sync {
    async fn get_by_allocation(&self, allocation_id: Uuid) -> anyhow::Result<Vec<Association>>;

    /// Remove the association of `username` with the allocation, if any.
    async fn delete_by_username(&self, allocation_id: Uuid, username: &str)
        -> anyhow::Result<()>;
}
