use std::sync::Arc;

use domain_accounting::service::{
    AccountingBackend, AllocationProvisionService, AllocationSyncService, RemoteExecutor,
    ScopeQuotaService,
};
use infrastructure_command::SshProxy;
use service_accounting::{
    build_backend, AllocationLocks, AllocationProvisionServiceImpl, AllocationSyncServiceImpl,
    ScopeQuotaServiceImpl,
};

use super::JSONRepository;
use crate::{
    background_service::{interval_runner::IntervalRunner, BackgroundService},
    config::AccountingConfig,
};

pub struct ServiceProvider {
    pub backend: Arc<dyn AccountingBackend>,
    interval_runner: Arc<IntervalRunner>,
}

impl ServiceProvider {
    pub async fn build(config: &AccountingConfig) -> anyhow::Result<Self> {
        let executor: Arc<dyn RemoteExecutor> = Arc::new(SshProxy::new(config.ssh.ssh_config()));
        Self::with_executor(config, executor).await
    }

    pub async fn with_executor(
        config: &AccountingConfig,
        executor: Arc<dyn RemoteExecutor>,
    ) -> anyhow::Result<Self> {
        let repository = Arc::new(JSONRepository::new(&config.sync.data_dir).await?);
        let backend = build_backend(
            config.scheduler.kind,
            executor,
            config.ssh.exec_options(),
        );
        let locks = Arc::new(AllocationLocks::new());

        let scope_quota_service: Arc<dyn ScopeQuotaService> = Arc::new(
            ScopeQuotaServiceImpl::builder()
                .allocation_repo(repository.clone())
                .scope_repo(repository.clone())
                .build(),
        );
        let sync_service: Arc<dyn AllocationSyncService> = Arc::new(
            AllocationSyncServiceImpl::builder()
                .backend(backend.clone())
                .allocation_repo(repository.clone())
                .association_repo(repository.clone())
                .usage_repo(repository.clone())
                .user_repo(repository.clone())
                .scope_quota_service(scope_quota_service.clone())
                .locks(locks.clone())
                .build(),
        );
        let provision_service: Arc<dyn AllocationProvisionService> = Arc::new(
            AllocationProvisionServiceImpl::builder()
                .backend(backend.clone())
                .allocation_repo(repository.clone())
                .association_repo(repository.clone())
                .scope_repo(repository.clone())
                .scope_quota_service(scope_quota_service)
                .naming(config.scheduler.naming())
                .default_limits(config.scheduler.default_limits)
                .locks(locks)
                .build(),
        );
        let interval_runner = Arc::new(
            IntervalRunner::builder()
                .sync_service(sync_service)
                .provision_service(provision_service)
                .allocation_repo(repository)
                .interval(config.sync.interval())
                .build(),
        );

        Ok(Self {
            backend,
            interval_runner,
        })
    }

    pub fn background_services(&self) -> Vec<Arc<dyn BackgroundService>> {
        vec![self.interval_runner.clone()]
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Utc};
    use domain_accounting::{
        mock::MockRemoteExecutor,
        model::{
            entity::{Allocation, AllocationUsage, AllocationUserUsage, Organization, Project, User},
            vo::{AllocationState, Quotas},
        },
    };
    use indoc::indoc;
    use uuid::Uuid;

    use super::*;
    use crate::infrastructure::repository::tests::temp_dir;

    async fn write_json<T: serde::Serialize>(dir: &std::path::Path, name: &str, rows: &[T]) {
        tokio::fs::write(dir.join(name), serde_json::to_vec(rows).unwrap()).await.unwrap();
    }

    async fn read_json<T: serde::de::DeserializeOwned>(dir: &std::path::Path, name: &str) -> Vec<T> {
        serde_json::from_slice(&tokio::fs::read(dir.join(name)).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn reconcile_pass_reaches_files_and_scopes() {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: "org".to_string(),
            ..Default::default()
        };
        let project = Project {
            id: Uuid::new_v4(),
            name: "project".to_string(),
            organization_id: organization.id,
            ..Default::default()
        };
        let allocation = Allocation {
            id: Uuid::new_v4(),
            name: "X".to_string(),
            backend_id: "allocationX".to_string(),
            state: AllocationState::Erred,
            is_active: true,
            project_id: project.id,
            ..Default::default()
        };
        let user = User {
            id: Uuid::new_v4(),
            username: "user1".to_string(),
            ..Default::default()
        };
        write_json(&dir, "organizations.json", &[organization.clone()]).await;
        write_json(&dir, "projects.json", &[project.clone()]).await;
        write_json(&dir, "allocations.json", &[allocation.clone()]).await;
        write_json(&dir, "users.json", &[user.clone()]).await;

        let mut executor = MockRemoteExecutor::new();
        executor.expect_run().returning(|command, _| {
            let line = command.join(" ");
            Ok(if line.starts_with("sacct ") {
                indoc! {"
                    allocationx|cpu=1,mem=51200M,node=1,gres/gpu=1|00:01:00|user1|
                    allocationx|cpu=2,mem=51200M,node=2,gres/gpu=2|00:02:00|user2|
                    allocationx|cpu=2,mem=51200M,node=1,gres/gpu=1|00:00:30|user2|
                "}
                .to_string()
            } else if line.contains("GrpTRES") {
                "allocationx||cpu=100,mem=2048,gres/gpu=4\n".to_string()
            } else if line.contains("format=Account,User") {
                "allocationx|\nallocationx|user1\n".to_string()
            } else {
                String::new()
            })
        });

        let config = AccountingConfig {
            sync: crate::config::SyncConfig {
                data_dir: dir.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        let provider = ServiceProvider::with_executor(&config, Arc::new(executor))
            .await
            .unwrap();
        provider.interval_runner.reconcile().await;

        let expected = Quotas::new(9, 9, 5 * 51200 * (1 << 20));
        let allocations: Vec<Allocation> = read_json(&dir, "allocations.json").await;
        assert_eq!(allocations[0].usage(), expected);
        assert_eq!(allocations[0].state, AllocationState::Ok);
        assert_eq!(allocations[0].cpu_limit, 100);
        assert_eq!(allocations[0].gpu_limit, 4);

        let projects: Vec<Project> = read_json(&dir, "projects.json").await;
        assert_eq!(projects[0].usage.nc_cpu_usage, 9);
        let organizations: Vec<Organization> = read_json(&dir, "organizations.json").await;
        assert_eq!(organizations[0].usage.nc_ram_usage, expected.ram);

        let now = Utc::now();
        let usages: Vec<AllocationUsage> = read_json(&dir, "allocation_usages.json").await;
        assert_eq!(usages.len(), 1);
        assert_eq!((usages[0].year, usages[0].month), (now.year(), now.month()));
        let user_usages: Vec<AllocationUserUsage> =
            read_json(&dir, "allocation_user_usages.json").await;
        assert_eq!(user_usages.len(), 2);
        let first = user_usages.iter().find(|x| x.username == "user1").unwrap();
        assert_eq!(first.user_id, Some(user.id));
        assert_eq!(first.cpu_usage, 1);

        let associations: Vec<domain_accounting::model::entity::Association> =
            read_json(&dir, "associations.json").await;
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].username, "user1");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
