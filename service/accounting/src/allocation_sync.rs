use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use domain_accounting::{
    exception::AccountingResult,
    model::{
        entity::{Allocation, AllocationUsage, AllocationUserUsage, Association},
        vo::{AccountUsage, AllocationState},
    },
    repository::{AllocationRepo, AllocationUsageRepo, AssociationRepo, UserRepo},
    service::{
        AccountingBackend, AllocationSyncService, AssociationChanges, ScopeQuotaService,
        SyncSummary,
    },
};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{by_lowercase_account, load_allocation, rollback_on_error, AllocationLocks};

#[derive(TypedBuilder)]
pub struct AllocationSyncServiceImpl {
    backend: Arc<dyn AccountingBackend>,
    allocation_repo: Arc<dyn AllocationRepo>,
    association_repo: Arc<dyn AssociationRepo>,
    usage_repo: Arc<dyn AllocationUsageRepo>,
    user_repo: Arc<dyn UserRepo>,
    scope_quota_service: Arc<dyn ScopeQuotaService>,
    #[builder(default)]
    locks: Arc<AllocationLocks>,
}

impl AllocationSyncServiceImpl {
    async fn pull(&self, allocation_id: Uuid) -> AccountingResult<()> {
        let mut allocation = load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
        let backend_id = allocation.backend_id()?.to_string();

        let report = self.backend.get_usage_report(std::slice::from_ref(&backend_id)).await?;
        let usage = by_lowercase_account(report)
            .remove(&backend_id.to_lowercase())
            .unwrap_or_default();
        self.update_quotas(&mut allocation, &usage).await?;

        if let Some(limits) = self.backend.get_resource_limits(&backend_id).await? {
            if allocation.apply_limits(&limits) {
                tracing::info!("Limits of allocation {allocation_id} are now {limits}");
            }
        }

        self.sync_associations(&allocation).await?;

        if allocation.state == AllocationState::Erred {
            allocation.transition(AllocationState::Ok)?;
            tracing::info!("Allocation {allocation_id} recovered from erred state");
        }
        self.allocation_repo.update(&allocation).await?;
        self.allocation_repo.save_changed().await?;
        Ok(())
    }

    async fn sync_all(&self) -> AccountingResult<SyncSummary> {
        let allocations = self.allocation_repo.get_provisioned().await?;
        let by_account: HashMap<String, Uuid> = allocations
            .iter()
            .filter_map(|a| a.backend_id().ok().map(|b| (b.to_lowercase(), a.id)))
            .collect();
        let mut summary = SyncSummary::default();
        if by_account.is_empty() {
            return Ok(summary);
        }

        let accounts: Vec<String> = allocations
            .iter()
            .filter_map(|a| a.backend_id().ok().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let report = self.backend.get_usage_report(&accounts).await?;

        for (account, usage) in by_lowercase_account(report) {
            let Some(&allocation_id) = by_account.get(&account) else {
                tracing::warn!("Skipping usage of account {account}: no allocation matches it");
                summary.skipped.push(account);
                continue;
            };
            let _guard = self.locks.lock(allocation_id).await;
            let mut allocation =
                load_allocation(self.allocation_repo.as_ref(), allocation_id).await?;
            self.update_quotas(&mut allocation, &usage).await?;
            summary.updated.push(allocation_id);
        }

        if !summary.updated.is_empty() {
            self.allocation_repo.save_changed().await?;
        }
        tracing::info!(
            "Usage synced for {} allocations, {} accounts skipped",
            summary.updated.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }
}

#[async_trait]
impl AllocationSyncService for AllocationSyncServiceImpl {
    async fn pull_allocation(&self, allocation_id: Uuid) -> AccountingResult<()> {
        let _guard = self.locks.lock(allocation_id).await;
        rollback_on_error(self.allocation_repo.as_ref(), self.pull(allocation_id)).await
    }

    async fn sync_usage(&self) -> AccountingResult<SyncSummary> {
        rollback_on_error(self.allocation_repo.as_ref(), self.sync_all()).await
    }

    async fn sync_associations(
        &self,
        allocation: &Allocation,
    ) -> AccountingResult<AssociationChanges> {
        let backend_id = allocation.backend_id()?;
        let remote: BTreeSet<String> =
            self.backend.list_account_users(backend_id).await?.into_iter().collect();
        let local: BTreeSet<String> = self
            .association_repo
            .get_by_allocation(allocation.id)
            .await?
            .into_iter()
            .map(|association| association.username)
            .collect();

        let mut changes = AssociationChanges::default();
        for username in local.difference(&remote) {
            self.association_repo.delete_by_username(allocation.id, username).await?;
            changes.deleted.push(username.clone());
        }
        for username in remote.difference(&local) {
            self.association_repo
                .insert(&Association::new(allocation.id, username.as_str()))
                .await?;
            changes.created.push(username.clone());
        }

        if !changes.is_empty() {
            tracing::info!(
                "Associations of allocation {} synced: created {:?}, deleted {:?}",
                allocation.id,
                changes.created,
                changes.deleted
            );
        }
        Ok(changes)
    }

    async fn update_quotas(
        &self,
        allocation: &mut Allocation,
        usage: &AccountUsage,
    ) -> AccountingResult<bool> {
        let changed = allocation.apply_usage(&usage.total);
        self.allocation_repo.update(allocation).await?;

        let now = Utc::now();
        let snapshot = self
            .usage_repo
            .upsert_usage(&AllocationUsage::new(
                allocation.id,
                now.year(),
                now.month(),
                &usage.total,
            ))
            .await?;
        for (username, quotas) in &usage.users {
            let user_id = self.user_repo.get_by_username(username).await?.map(|user| user.id);
            self.usage_repo
                .upsert_user_usage(&AllocationUserUsage::new(
                    snapshot.id,
                    username.as_str(),
                    user_id,
                    quotas,
                ))
                .await?;
        }

        if changed {
            self.scope_quota_service.propagate_from_project(allocation.project_id).await?;
        }
        Ok(changed)
    }
}
