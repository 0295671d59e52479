use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{
    entity::{Organization, Project},
    vo::{Scope, ScopeUsage},
};

#[async_trait]
pub trait ScopeRepo: Send + Sync {
    async fn get_project(&self, id: Uuid) -> anyhow::Result<Project>;

    async fn get_organization(&self, id: Uuid) -> anyhow::Result<Organization>;

    async fn get_projects_by_organization(
        &self,
        organization_id: Uuid,
    ) -> anyhow::Result<Vec<Project>>;

    /// Overwrite the cached usage counters of a scope.
    async fn update_usage(&self, scope: Scope, usage: &ScopeUsage) -> anyhow::Result<()>;
}
