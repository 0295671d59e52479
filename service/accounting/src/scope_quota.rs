use std::sync::Arc;

use async_trait::async_trait;
use domain_accounting::{
    exception::AccountingResult,
    model::{
        entity::Allocation,
        vo::{Quotas, Scope, ScopeUsage},
    },
    repository::{AllocationRepo, ScopeRepo},
    service::ScopeQuotaService,
};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(TypedBuilder)]
pub struct ScopeQuotaServiceImpl {
    allocation_repo: Arc<dyn AllocationRepo>,
    scope_repo: Arc<dyn ScopeRepo>,
}

impl ScopeQuotaServiceImpl {
    async fn project_usage(&self, project_id: Uuid) -> anyhow::Result<Quotas> {
        let allocations = self.allocation_repo.get_by_project(project_id).await?;
        Ok(allocations.iter().map(Allocation::usage).sum())
    }
}

#[async_trait]
impl ScopeQuotaService for ScopeQuotaServiceImpl {
    async fn recompute_scope_usage(&self, scope: Scope) -> AccountingResult<ScopeUsage> {
        let total = match scope {
            Scope::Project(id) => self.project_usage(id).await?,
            Scope::Organization(id) => {
                let mut total = Quotas::ZERO;
                for project in self.scope_repo.get_projects_by_organization(id).await? {
                    total = total + self.project_usage(project.id).await?;
                }
                total
            }
        };
        let usage = ScopeUsage::from(total);
        self.scope_repo.update_usage(scope, &usage).await?;
        tracing::debug!("Usage of {scope:?} is now {usage:?}");
        Ok(usage)
    }

    async fn propagate_from_project(&self, project_id: Uuid) -> AccountingResult<()> {
        let project = self.scope_repo.get_project(project_id).await?;
        self.recompute_scope_usage(Scope::Project(project.id)).await?;
        self.recompute_scope_usage(Scope::Organization(project.organization_id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain_accounting::{
        mock::{MockAllocationRepo, MockScopeRepo},
        model::entity::Project,
    };

    use super::*;

    fn allocation(project_id: Uuid, cpu: u64, ram: u64) -> Allocation {
        Allocation {
            id: Uuid::new_v4(),
            project_id,
            cpu_usage: cpu,
            ram_usage: ram,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn organization_sums_every_project() {
        let organization_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let mut allocation_repo = MockAllocationRepo::new();
        allocation_repo.expect_get_by_project().returning(move |project_id| {
            Ok(if project_id == first {
                vec![allocation(first, 1, 10), allocation(first, 2, 20)]
            } else {
                vec![allocation(second, 4, 40)]
            })
        });

        let mut scope_repo = MockScopeRepo::new();
        scope_repo.expect_get_project().returning(move |id| {
            Ok(Project {
                id,
                name: "project".to_string(),
                organization_id,
                ..Default::default()
            })
        });
        scope_repo
            .expect_get_projects_by_organization()
            .returning(move |organization_id| {
                Ok([first, second]
                    .into_iter()
                    .map(|id| Project {
                        id,
                        organization_id,
                        ..Default::default()
                    })
                    .collect())
            });
        scope_repo
            .expect_update_usage()
            .withf(move |scope, usage| {
                *scope == Scope::Project(first) && usage.nc_cpu_usage == 3 && usage.nc_ram_usage == 30
            })
            .times(1)
            .returning(|_, _| Ok(()));
        scope_repo
            .expect_update_usage()
            .withf(move |scope, usage| {
                *scope == Scope::Organization(organization_id)
                    && usage.nc_cpu_usage == 7
                    && usage.nc_ram_usage == 70
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = ScopeQuotaServiceImpl::builder()
            .allocation_repo(Arc::new(allocation_repo))
            .scope_repo(Arc::new(scope_repo))
            .build();
        service.propagate_from_project(first).await.unwrap();
    }

    #[tokio::test]
    async fn empty_project_is_zero() {
        let mut allocation_repo = MockAllocationRepo::new();
        allocation_repo.expect_get_by_project().returning(|_| Ok(vec![]));
        let mut scope_repo = MockScopeRepo::new();
        scope_repo
            .expect_update_usage()
            .withf(|_, usage| *usage == ScopeUsage::default())
            .times(1)
            .returning(|_, _| Ok(()));
        let service = ScopeQuotaServiceImpl::builder()
            .allocation_repo(Arc::new(allocation_repo))
            .scope_repo(Arc::new(scope_repo))
            .build();
        let usage = service.recompute_scope_usage(Scope::Project(Uuid::new_v4())).await.unwrap();
        assert_eq!(usage, ScopeUsage::default());
    }
}
