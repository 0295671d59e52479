use std::sync::Arc;

use async_trait::async_trait;
use domain_accounting::{
    exception::AccountingResult,
    model::{
        entity::{Allocation, Association},
        vo::{Account, AllocationState, ResourceLimits},
    },
    repository::{AllocationRepo, AssociationRepo, ScopeRepo},
    service::{AccountingBackend, AllocationProvisionService, ScopeQuotaService},
};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{load_allocation, rollback_on_error, AccountNaming, AllocationLocks};

#[derive(TypedBuilder)]
pub struct AllocationProvisionServiceImpl {
    backend: Arc<dyn AccountingBackend>,
    allocation_repo: Arc<dyn AllocationRepo>,
    association_repo: Arc<dyn AssociationRepo>,
    scope_repo: Arc<dyn ScopeRepo>,
    scope_quota_service: Arc<dyn ScopeQuotaService>,
    naming: AccountNaming,
    /// Limits set on every new allocation account.
    #[builder(default)]
    default_limits: ResourceLimits,
    #[builder(default)]
    locks: Arc<AllocationLocks>,
}

impl AllocationProvisionServiceImpl {
    async fn move_to(
        &self,
        allocation: &mut Allocation,
        state: AllocationState,
    ) -> AccountingResult<()> {
        let from = allocation.state;
        allocation.transition(state)?;
        self.allocation_repo.update(allocation).await?;
        self.allocation_repo.save_changed().await?;
        tracing::info!("Allocation {} moved from {from} to {state}", allocation.id);
        Ok(())
    }

    async fn ensure_account(&self, account: Account, parent: Option<&str>) -> AccountingResult<()> {
        if self.backend.get_account(&account.name).await?.is_none() {
            self.backend.create_account(&account, parent).await?;
        }
        Ok(())
    }

    /// Remove `name` when it exists and nothing is left under it.
    async fn remove_if_unused(&self, name: &str) -> AccountingResult<()> {
        if self.backend.get_account(name).await?.is_none() {
            return Ok(());
        }
        let children = self.backend.list_child_accounts(name).await?;
        if children.is_empty() {
            self.backend.delete_account(name).await?;
        } else {
            tracing::debug!("Keeping account {name}, it still has {children:?}");
        }
        Ok(())
    }

    async fn has_association(&self, allocation_id: Uuid, username: &str) -> AccountingResult<bool> {
        Ok(self
            .association_repo
            .get_by_allocation(allocation_id)
            .await?
            .iter()
            .any(|association| association.username == username))
    }

    async fn create(&self, allocation_id: Uuid) -> AccountingResult<()> {
        let mut allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        if allocation.state == AllocationState::Erred && allocation.backend_id().is_err() {
            self.move_to(&mut allocation, AllocationState::CreationScheduled).await?;
        }
        self.move_to(&mut allocation, AllocationState::Creating).await?;

        let project = self.scope_repo.get_project(allocation.project_id).await?;
        let organization = self.scope_repo.get_organization(project.organization_id).await?;
        let organization_account = self.naming.organization(organization.id);
        let project_account = self.naming.project(project.id);
        let allocation_account = self.naming.allocation(allocation.id);

        let root = Some(self.naming.default_account.as_str()).filter(|name| !name.is_empty());
        if let Some(root) = root {
            self.ensure_account(
                Account {
                    name: root.to_string(),
                    description: root.to_string(),
                    organization: root.to_string(),
                },
                None,
            )
            .await?;
        }
        self.ensure_account(
            Account {
                name: organization_account.clone(),
                description: organization.name.clone(),
                organization: organization_account.clone(),
            },
            root,
        )
        .await?;
        self.ensure_account(
            Account {
                name: project_account.clone(),
                description: project.name.clone(),
                organization: organization_account.clone(),
            },
            Some(organization_account.as_str()),
        )
        .await?;
        self.ensure_account(
            Account {
                name: allocation_account.clone(),
                description: allocation.name.clone(),
                organization: organization_account.clone(),
            },
            Some(project_account.as_str()),
        )
        .await?;
        allocation.backend_id = allocation_account.clone();
        self.allocation_repo.update(&allocation).await?;
        self.allocation_repo.save_changed().await?;

        if !self.default_limits.is_empty() {
            self.backend
                .set_resource_limits(&allocation_account, &self.default_limits)
                .await?;
            allocation.apply_limits(&self.default_limits);
        }
        self.move_to(&mut allocation, AllocationState::Ok).await
    }

    async fn apply_limits(
        &self,
        allocation_id: Uuid,
        limits: &ResourceLimits,
    ) -> AccountingResult<()> {
        let mut allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        let backend_id = allocation.backend_id()?.to_string();
        self.move_to(&mut allocation, AllocationState::Updating).await?;

        self.backend.set_resource_limits(&backend_id, limits).await?;
        allocation.apply_limits(limits);
        self.move_to(&mut allocation, AllocationState::Ok).await
    }

    async fn delete(&self, allocation_id: Uuid) -> AccountingResult<()> {
        let mut allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        // A creation that failed early never stored the account name.
        let backend_id = allocation
            .backend_id()
            .map(str::to_string)
            .unwrap_or_else(|_| self.naming.allocation(allocation.id));
        if allocation.state != AllocationState::DeletionScheduled {
            allocation.transition(AllocationState::DeletionScheduled)?;
        }
        self.move_to(&mut allocation, AllocationState::Deleting).await?;

        let project = self.scope_repo.get_project(allocation.project_id).await?;
        self.remove_if_unused(&backend_id).await?;
        self.remove_if_unused(&self.naming.project(project.id)).await?;
        self.remove_if_unused(&self.naming.organization(project.organization_id))
            .await?;

        for association in self.association_repo.get_by_allocation(allocation_id).await? {
            self.association_repo.delete_by_id(association.id).await?;
        }
        self.allocation_repo.delete_by_id(allocation_id).await?;
        self.scope_quota_service.propagate_from_project(project.id).await?;
        self.allocation_repo.save_changed().await?;
        tracing::info!("Allocation {allocation_id} deleted");
        Ok(())
    }

    async fn associate(&self, allocation_id: Uuid, username: &str) -> AccountingResult<()> {
        let allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        let backend_id = allocation.backend_id()?;
        if self.has_association(allocation_id, username).await? {
            return Ok(());
        }
        let remote = self.backend.list_account_users(backend_id).await?;
        if !remote.iter().any(|user| user == username) {
            self.backend.add_user(backend_id, username).await?;
        }
        self.association_repo.insert(&Association::new(allocation_id, username)).await?;
        self.allocation_repo.save_changed().await?;
        Ok(())
    }

    async fn dissociate(&self, allocation_id: Uuid, username: &str) -> AccountingResult<()> {
        let allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        let backend_id = allocation.backend_id()?;
        if !self.has_association(allocation_id, username).await? {
            return Ok(());
        }
        let remote = self.backend.list_account_users(backend_id).await?;
        if remote.iter().any(|user| user == username) {
            self.backend.delete_user(backend_id, username).await?;
        }
        self.association_repo.delete_by_username(allocation_id, username).await?;
        self.allocation_repo.save_changed().await?;
        Ok(())
    }

    async fn record_error(&self, allocation_id: Uuid, message: &str) -> AccountingResult<()> {
        let mut allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        tracing::error!("Allocation {allocation_id} erred: {message}");
        allocation.set_erred(message);
        self.allocation_repo.update(&allocation).await?;
        self.allocation_repo.save_changed().await?;
        Ok(())
    }
}

#[async_trait]
impl AllocationProvisionService for AllocationProvisionServiceImpl {
    async fn create_allocation(&self, allocation_id: Uuid) -> AccountingResult<()> {
        let _guard = self.locks.lock(allocation_id).await;
        rollback_on_error(self.allocation_repo.as_ref(), self.create(allocation_id)).await
    }

    async fn update_limits(
        &self,
        allocation_id: Uuid,
        limits: ResourceLimits,
    ) -> AccountingResult<()> {
        let _guard = self.locks.lock(allocation_id).await;
        rollback_on_error(
            self.allocation_repo.as_ref(),
            self.apply_limits(allocation_id, &limits),
        )
        .await
    }

    async fn delete_allocation(&self, allocation_id: Uuid) -> AccountingResult<()> {
        let guard = self.locks.lock(allocation_id).await;
        rollback_on_error(self.allocation_repo.as_ref(), self.delete(allocation_id)).await?;
        drop(guard);
        self.locks.forget(allocation_id);
        Ok(())
    }

    async fn add_association(&self, allocation_id: Uuid, username: &str) -> AccountingResult<()> {
        let _guard = self.locks.lock(allocation_id).await;
        rollback_on_error(
            self.allocation_repo.as_ref(),
            self.associate(allocation_id, username),
        )
        .await
    }

    async fn remove_association(
        &self,
        allocation_id: Uuid,
        username: &str,
    ) -> AccountingResult<()> {
        let _guard = self.locks.lock(allocation_id).await;
        rollback_on_error(
            self.allocation_repo.as_ref(),
            self.dissociate(allocation_id, username),
        )
        .await
    }

    async fn set_erred(&self, allocation_id: Uuid, message: &str) -> AccountingResult<()> {
        let _guard = self.locks.lock(allocation_id).await;
        rollback_on_error(
            self.allocation_repo.as_ref(),
            self.record_error(allocation_id, message),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Mutex};

    use domain_accounting::{
        exception::{AccountingException, BatchError},
        mock::{
            MockAllocationRepo, MockAssociationRepo, MockRemoteExecutor, MockScopeQuotaService,
            MockScopeRepo,
        },
        model::entity::{Organization, Project},
    };

    use super::*;
    use crate::{
        backend::tests::{responding_executor, scripted_executor},
        SlurmBackend,
    };

    struct Fixture {
        allocation: Allocation,
        project: Project,
        organization: Organization,
        stored: Arc<Mutex<Allocation>>,
    }

    impl Fixture {
        fn new(state: AllocationState, backend_id: &str) -> Self {
            let organization = Organization {
                id: Uuid::new_v4(),
                name: "Org".to_string(),
                ..Default::default()
            };
            let project = Project {
                id: Uuid::new_v4(),
                name: "Project".to_string(),
                organization_id: organization.id,
                ..Default::default()
            };
            let allocation = Allocation {
                id: Uuid::new_v4(),
                name: "Alloc".to_string(),
                backend_id: backend_id.to_string(),
                state,
                project_id: project.id,
                ..Default::default()
            };
            Self {
                stored: Arc::new(Mutex::new(allocation.clone())),
                allocation,
                project,
                organization,
            }
        }

        fn allocation_repo(&self) -> MockAllocationRepo {
            let mut repo = MockAllocationRepo::new();
            let stored = self.stored.clone();
            repo.expect_get_by_id().returning(move |_| Ok(stored.lock().unwrap().clone()));
            let stored = self.stored.clone();
            repo.expect_update().returning(move |a| {
                *stored.lock().unwrap() = a.clone();
                Ok(())
            });
            repo.expect_save_changed().returning(|| Ok(true));
            repo.expect_discard_changed().returning(|| Ok(()));
            repo
        }

        fn scope_repo(&self) -> MockScopeRepo {
            let mut repo = MockScopeRepo::new();
            let project = self.project.clone();
            repo.expect_get_project().returning(move |_| Ok(project.clone()));
            let organization = self.organization.clone();
            repo.expect_get_organization().returning(move |_| Ok(organization.clone()));
            repo
        }

        fn service(
            &self,
            answers: Vec<(&'static str, &'static str)>,
            allocation_repo: MockAllocationRepo,
            association_repo: MockAssociationRepo,
            scope_quota_service: MockScopeQuotaService,
        ) -> (AllocationProvisionServiceImpl, Arc<Mutex<Vec<String>>>) {
            let (executor, calls) = scripted_executor(answers);
            let service =
                self.builder(executor, allocation_repo, association_repo, scope_quota_service);
            (service, calls)
        }

        fn builder(
            &self,
            executor: Arc<MockRemoteExecutor>,
            allocation_repo: MockAllocationRepo,
            association_repo: MockAssociationRepo,
            scope_quota_service: MockScopeQuotaService,
        ) -> AllocationProvisionServiceImpl {
            AllocationProvisionServiceImpl::builder()
                .backend(Arc::new(SlurmBackend::builder().executor(executor).build()))
                .allocation_repo(Arc::new(allocation_repo))
                .association_repo(Arc::new(association_repo))
                .scope_repo(Arc::new(self.scope_repo()))
                .scope_quota_service(Arc::new(scope_quota_service))
                .naming(AccountNaming::builder().build())
                .default_limits(ResourceLimits {
                    cpu: 100,
                    gpu: 0,
                    ram: 1024,
                })
                .build()
        }
    }

    #[tokio::test]
    async fn create_builds_account_tree() {
        let fixture = Fixture::new(AllocationState::CreationScheduled, "");
        let (service, calls) = fixture.service(
            vec![("list account name=waldur", "waldur|waldur|waldur\n")],
            fixture.allocation_repo(),
            MockAssociationRepo::new(),
            MockScopeQuotaService::new(),
        );
        service.create_allocation(fixture.allocation.id).await.unwrap();

        let allocation_account = format!("hpc_{}", fixture.allocation.id.simple());
        let project_account = format!("hpc_{}", fixture.project.id.simple());
        let organization_account = format!("hpc_{}", fixture.organization.id.simple());
        let calls = calls.lock().unwrap();
        let adds: Vec<&String> = calls.iter().filter(|c| c.contains(" add account ")).collect();
        assert_eq!(adds.len(), 3);
        assert!(adds[0].contains(&organization_account) && adds[0].ends_with("parent=waldur"));
        assert!(adds[1].contains(&project_account));
        assert!(adds[1].ends_with(&format!("parent={organization_account}")));
        assert!(adds[2].contains(&allocation_account));
        assert!(adds[2].ends_with(&format!("parent={project_account}")));
        assert!(calls.last().unwrap().ends_with("set GrpTRES=cpu=100,gres/gpu=0,mem=1024"));

        let stored = fixture.stored.lock().unwrap();
        assert_eq!(stored.state, AllocationState::Ok);
        assert_eq!(stored.backend_id, allocation_account);
        assert_eq!(stored.cpu_limit, 100);
    }

    /// Executor acting as a cluster that keeps the accounts it is asked to
    /// create and refuses to set limits.
    fn cluster_refusing_limits() -> (Arc<MockRemoteExecutor>, Arc<Mutex<BTreeSet<String>>>) {
        let accounts = Arc::new(Mutex::new(BTreeSet::new()));
        let cluster = accounts.clone();
        let mut executor = MockRemoteExecutor::new();
        executor.expect_run().returning(move |command, _| {
            let mut accounts = cluster.lock().unwrap();
            let named = |prefix: &str| {
                command
                    .iter()
                    .find_map(|token| token.strip_prefix(prefix))
                    .map(str::to_string)
            };
            let has = |word: &str| command.iter().any(|token| token == word);
            if command.iter().any(|token| token.starts_with("GrpTRES=")) {
                return Err(BatchError::Failed {
                    message: "Permission denied".to_string(),
                });
            }
            if has("add") {
                let name = command
                    .iter()
                    .skip_while(|token| *token != "account")
                    .nth(1)
                    .cloned()
                    .unwrap_or_default();
                accounts.insert(name);
            } else if has("remove") {
                if let Some(name) = named("name=") {
                    accounts.remove(&name);
                }
            } else if has("list") && has("account") {
                return Ok(named("name=")
                    .filter(|name| accounts.contains(name))
                    .map(|name| format!("{name}|x|x\n"))
                    .unwrap_or_default());
            }
            Ok(String::new())
        });
        (Arc::new(executor), accounts)
    }

    #[tokio::test]
    async fn failed_limits_leave_a_deletable_allocation() {
        let fixture = Fixture::new(AllocationState::CreationScheduled, "");
        let id = fixture.allocation.id;
        let mut allocation_repo = fixture.allocation_repo();
        allocation_repo.expect_delete_by_id().times(1).returning(|_| Ok(()));
        let mut association_repo = MockAssociationRepo::new();
        association_repo.expect_get_by_allocation().returning(|_| Ok(vec![]));
        let mut scope_quota_service = MockScopeQuotaService::new();
        scope_quota_service
            .expect_propagate_from_project()
            .times(1)
            .returning(|_| Ok(()));
        let (executor, accounts) = cluster_refusing_limits();
        let service =
            fixture.builder(executor, allocation_repo, association_repo, scope_quota_service);

        let err = service.create_allocation(id).await.unwrap_err();
        assert_eq!(err.to_string(), "Permission denied");
        assert_eq!(accounts.lock().unwrap().len(), 4);
        let allocation_account = format!("hpc_{}", id.simple());
        assert_eq!(fixture.stored.lock().unwrap().backend_id, allocation_account);

        service.set_erred(id, &err.to_string()).await.unwrap();
        service.delete_allocation(id).await.unwrap();
        assert_eq!(
            accounts.lock().unwrap().iter().collect::<Vec<_>>(),
            vec!["waldur"]
        );
    }

    #[tokio::test]
    async fn early_failed_creation_can_be_retried_or_deleted() {
        let fixture = Fixture::new(AllocationState::Erred, "");
        let id = fixture.allocation.id;
        let (service, _) = fixture.service(
            vec![],
            fixture.allocation_repo(),
            MockAssociationRepo::new(),
            MockScopeQuotaService::new(),
        );
        service.create_allocation(id).await.unwrap();
        {
            let stored = fixture.stored.lock().unwrap();
            assert_eq!(stored.state, AllocationState::Ok);
            assert_eq!(stored.backend_id, format!("hpc_{}", id.simple()));
        }

        let fixture = Fixture::new(AllocationState::Erred, "");
        let id = fixture.allocation.id;
        let mut allocation_repo = fixture.allocation_repo();
        allocation_repo.expect_delete_by_id().times(1).returning(|_| Ok(()));
        let mut association_repo = MockAssociationRepo::new();
        association_repo.expect_get_by_allocation().returning(|_| Ok(vec![]));
        let mut scope_quota_service = MockScopeQuotaService::new();
        scope_quota_service
            .expect_propagate_from_project()
            .times(1)
            .returning(|_| Ok(()));
        let (service, calls) =
            fixture.service(vec![], allocation_repo, association_repo, scope_quota_service);
        service.delete_allocation(id).await.unwrap();
        assert!(!calls.lock().unwrap().iter().any(|c| c.contains("remove account")));
    }

    #[tokio::test]
    async fn update_limits_requires_stable_state() {
        let fixture = Fixture::new(AllocationState::Creating, "hpc_a");
        let (service, calls) = fixture.service(
            vec![],
            fixture.allocation_repo(),
            MockAssociationRepo::new(),
            MockScopeQuotaService::new(),
        );
        let err = service
            .update_limits(fixture.allocation.id, ResourceLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingException::InvalidTransition { .. }));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_keeps_parents_with_children() {
        let fixture = Fixture::new(AllocationState::Ok, "hpc_a");
        let id = fixture.allocation.id;
        let organization_account = format!("hpc_{}", fixture.organization.id.simple());
        let mut association_repo = MockAssociationRepo::new();
        association_repo
            .expect_get_by_allocation()
            .returning(move |_| Ok(vec![Association::new(id, "alice")]));
        association_repo.expect_delete_by_id().times(1).returning(|_| Ok(()));
        let mut allocation_repo = fixture.allocation_repo();
        allocation_repo.expect_delete_by_id().times(1).returning(|_| Ok(()));
        let mut scope_quota_service = MockScopeQuotaService::new();
        scope_quota_service
            .expect_propagate_from_project()
            .times(1)
            .returning(|_| Ok(()));

        // Every account exists and the organization has another project.
        let children = format!("hpc_other|{organization_account}|\n");
        let (executor, calls) = responding_executor(move |line| {
            if line.contains("ParentName") {
                return children.clone();
            }
            line.split("list account name=")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .map(|name| format!("{name}|x|x\n"))
                .unwrap_or_default()
        });
        let service =
            fixture.builder(executor, allocation_repo, association_repo, scope_quota_service);
        service.delete_allocation(id).await.unwrap();

        let calls = calls.lock().unwrap();
        let removed: Vec<&String> =
            calls.iter().filter(|c| c.contains("remove account")).collect();
        assert_eq!(removed.len(), 2);
        assert!(removed[0].ends_with("name=hpc_a"));
        assert!(!removed.iter().any(|c| c.contains(&organization_account)));
        assert_eq!(fixture.stored.lock().unwrap().state, AllocationState::Deleting);
    }

    #[tokio::test]
    async fn associations_are_idempotent_locally() {
        let fixture = Fixture::new(AllocationState::Ok, "hpc_a");
        let id = fixture.allocation.id;
        let mut association_repo = MockAssociationRepo::new();
        association_repo
            .expect_get_by_allocation()
            .returning(move |_| Ok(vec![Association::new(id, "alice")]));
        association_repo.expect_insert().times(0);
        association_repo
            .expect_delete_by_username()
            .times(1)
            .returning(|_, _| Ok(()));
        let (service, calls) = fixture.service(
            vec![("format=Account,User ", "hpc_a|alice\n")],
            fixture.allocation_repo(),
            association_repo,
            MockScopeQuotaService::new(),
        );

        service.add_association(id, "alice").await.unwrap();
        service.remove_association(id, "bob").await.unwrap();
        assert!(calls.lock().unwrap().is_empty());

        service.remove_association(id, "alice").await.unwrap();
        assert!(calls
            .lock()
            .unwrap()
            .last()
            .unwrap()
            .ends_with("remove user where name=alice and account=hpc_a"));
    }

    #[tokio::test]
    async fn set_erred_records_message() {
        let fixture = Fixture::new(AllocationState::Creating, "");
        let (service, _) = fixture.service(
            vec![],
            fixture.allocation_repo(),
            MockAssociationRepo::new(),
            MockScopeQuotaService::new(),
        );
        service
            .set_erred(fixture.allocation.id, "Permission denied")
            .await
            .unwrap();
        let stored = fixture.stored.lock().unwrap();
        assert_eq!(stored.state, AllocationState::Erred);
        assert_eq!(stored.error_message, "Permission denied");
    }
}
