mod allocation;
mod allocation_usage;
mod association;
mod scope;
mod user;

use async_trait::async_trait;
use uuid::Uuid;

#[rustfmt::skip]
pub use {
    allocation::AllocationRepo,
    allocation_usage::AllocationUsageRepo,
    association::AssociationRepo,
    scope::ScopeRepo,
    user::UserRepo,
};

/// Read side of a repository.
#[async_trait]
pub trait ReadOnlyRepository<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Get one entity by id, failing when it doesn't exist.
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<T>;
    async fn get_all(&self) -> anyhow::Result<Vec<T>>;
}

/// Write side of a repository.
///
/// Changes become durable on `save_changed`; one logical reconciliation step
/// ends with exactly one call, or with `discard_changed` when it fails.
#[async_trait]
pub trait MutableRepository<T>: Send + Sync
where
    T: Send + Sync,
{
    async fn update(&self, entity: &T) -> anyhow::Result<()>;
    /// Insert, returning the id of the stored entity.
    async fn insert(&self, entity: &T) -> anyhow::Result<Uuid>;
    async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<()>;
    /// Commit pending changes. Returns `false` when there was nothing to commit.
    async fn save_changed(&self) -> anyhow::Result<bool>;
    /// Drop pending changes, going back to the last committed state.
    async fn discard_changed(&self) -> anyhow::Result<()>;
}

pub trait DBRepository<T>: ReadOnlyRepository<T> + MutableRepository<T>
where
    T: Send + Sync,
{
}
