use async_trait::async_trait;
use mockall::mock;
use uuid::Uuid;

use crate::{
    exception::{AccountingResult, BatchError},
    model::{
        entity::{
            Allocation, AllocationUsage, AllocationUserUsage, Association, Organization, Project,
            User,
        },
        vo::{AccountUsage, ResourceLimits, Scope, ScopeUsage},
    },
    repository::{
        AllocationRepo, AllocationUsageRepo, AssociationRepo, DBRepository, MutableRepository,
        ReadOnlyRepository, ScopeRepo, UserRepo,
    },
    service::{
        AllocationProvisionService, AllocationSyncService, AssociationChanges, ExecOptions,
        RemoteExecutor, ScopeQuotaService, SyncSummary,
    },
};

mock! {
    pub RemoteExecutor {}
    #[async_trait]
    impl RemoteExecutor for RemoteExecutor {
        async fn run(&self, command: &[String], options: ExecOptions) -> Result<String, BatchError>;
    }
}

mock! {
    pub AllocationRepo {}
    #[async_trait]
    impl AllocationRepo for AllocationRepo {
        async fn get_provisioned(&self) -> anyhow::Result<Vec<Allocation>>;
        async fn get_by_project(&self, project_id: Uuid) -> anyhow::Result<Vec<Allocation>>;
    }
    #[async_trait]
    impl ReadOnlyRepository<Allocation> for AllocationRepo {
        async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Allocation>;
        async fn get_all(&self) -> anyhow::Result<Vec<Allocation>>;
    }
    #[async_trait]
    impl MutableRepository<Allocation> for AllocationRepo {
        async fn update(&self, entity: &Allocation) -> anyhow::Result<()>;
        async fn insert(&self, entity: &Allocation) -> anyhow::Result<Uuid>;
        async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<()>;
        async fn save_changed(&self) -> anyhow::Result<bool>;
        async fn discard_changed(&self) -> anyhow::Result<()>;
    }
    impl DBRepository<Allocation> for AllocationRepo {}
}

mock! {
    pub AssociationRepo {}
    #[async_trait]
    impl AssociationRepo for AssociationRepo {
        async fn get_by_allocation(&self, allocation_id: Uuid) -> anyhow::Result<Vec<Association>>;
        async fn delete_by_username(&self, allocation_id: Uuid, username: &str) -> anyhow::Result<()>;
    }
    #[async_trait]
    impl ReadOnlyRepository<Association> for AssociationRepo {
        async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Association>;
        async fn get_all(&self) -> anyhow::Result<Vec<Association>>;
    }
    #[async_trait]
    impl MutableRepository<Association> for AssociationRepo {
        async fn update(&self, entity: &Association) -> anyhow::Result<()>;
        async fn insert(&self, entity: &Association) -> anyhow::Result<Uuid>;
        async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<()>;
        async fn save_changed(&self) -> anyhow::Result<bool>;
        async fn discard_changed(&self) -> anyhow::Result<()>;
    }
    impl DBRepository<Association> for AssociationRepo {}
}

mock! {
    pub AllocationUsageRepo {}
    #[async_trait]
    impl AllocationUsageRepo for AllocationUsageRepo {
        async fn upsert_usage(&self, usage: &AllocationUsage) -> anyhow::Result<AllocationUsage>;
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
}

mock! {
    pub ScopeRepo {}
    #[async_trait]
    impl ScopeRepo for ScopeRepo {
        async fn get_project(&self, id: Uuid) -> anyhow::Result<Project>;
        async fn get_organization(&self, id: Uuid) -> anyhow::Result<Organization>;
        async fn get_projects_by_organization(
            &self,
            organization_id: Uuid,
        ) -> anyhow::Result<Vec<Project>>;
        async fn update_usage(&self, scope: Scope, usage: &ScopeUsage) -> anyhow::Result<()>;
    }
}

mock! {
    pub UserRepo {}
    #[async_trait]
    impl UserRepo for UserRepo {
        async fn get_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    }
    #[async_trait]
    impl ReadOnlyRepository<User> for UserRepo {
        async fn get_by_id(&self, id: Uuid) -> anyhow::Result<User>;
        async fn get_all(&self) -> anyhow::Result<Vec<User>>;
    }
}

mock! {
    pub ScopeQuotaService {}
    #[async_trait]
    impl ScopeQuotaService for ScopeQuotaService {
        async fn recompute_scope_usage(&self, scope: Scope) -> AccountingResult<ScopeUsage>;
        async fn propagate_from_project(&self, project_id: Uuid) -> AccountingResult<()>;
    }
}

mock! {
    pub AllocationSyncService {}
    #[async_trait]
    impl AllocationSyncService for AllocationSyncService {
        async fn pull_allocation(&self, allocation_id: Uuid) -> AccountingResult<()>;
        async fn sync_usage(&self) -> AccountingResult<SyncSummary>;
        async fn sync_associations(&self, allocation: &Allocation)
            -> AccountingResult<AssociationChanges>;
        async fn update_quotas(
            &self,
            allocation: &mut Allocation,
            usage: &AccountUsage,
        ) -> AccountingResult<bool>;
    }
}

mock! {
    pub AllocationProvisionService {}
    #[async_trait]
    impl AllocationProvisionService for AllocationProvisionService {
        async fn create_allocation(&self, allocation_id: Uuid) -> AccountingResult<()>;
        async fn update_limits(
            &self,
            allocation_id: Uuid,
            limits: ResourceLimits,
        ) -> AccountingResult<()>;
        async fn delete_allocation(&self, allocation_id: Uuid) -> AccountingResult<()>;
        async fn add_association(&self, allocation_id: Uuid, username: &str) -> AccountingResult<()>;
        async fn remove_association(&self, allocation_id: Uuid, username: &str)
            -> AccountingResult<()>;
        async fn set_erred(&self, allocation_id: Uuid, message: &str) -> AccountingResult<()>;
    }
}
