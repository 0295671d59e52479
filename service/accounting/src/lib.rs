mod allocation_provision;
mod allocation_sync;
pub mod backend;
mod locks;
mod naming;
pub mod report;
mod scope_quota;

use std::{collections::BTreeMap, future::Future};

use domain_accounting::{
    exception::{AccountingException, AccountingResult},
    model::{
        entity::Allocation,
        vo::{AccountUsage, Quotas, UsageReport},
    },
    repository::AllocationRepo,
};
use uuid::Uuid;

pub use allocation_provision::AllocationProvisionServiceImpl;
pub use allocation_sync::AllocationSyncServiceImpl;
pub use backend::{build_backend, MoabBackend, SlurmBackend};
pub use locks::AllocationLocks;
pub use naming::AccountNaming;
pub use report::SchedulerKind;
pub use scope_quota::ScopeQuotaServiceImpl;

pub(crate) async fn load_allocation(
    repo: &dyn AllocationRepo,
    id: Uuid,
) -> AccountingResult<Allocation> {
    repo.get_by_id(id).await.map_err(|e| {
        tracing::debug!("Loading allocation {id} failed: {e:#}");
        AccountingException::AllocationNotFound { id }
    })
}

/// Await one reconciliation step, discarding its uncommitted writes when it
/// fails.
pub(crate) async fn rollback_on_error<T>(
    repo: &dyn AllocationRepo,
    step: impl Future<Output = AccountingResult<T>>,
) -> AccountingResult<T> {
    let result = step.await;
    if result.is_err() {
        if let Err(e) = repo.discard_changed().await {
            tracing::error!("Unable to discard uncommitted changes: {e:#}");
        }
    }
    result
}

/// Re-key a report by lowercase account name. Slurm stores account names in
/// lowercase, so local names are matched case-insensitively.
pub(crate) fn by_lowercase_account(report: UsageReport) -> BTreeMap<String, AccountUsage> {
    let mut merged: BTreeMap<String, BTreeMap<String, Quotas>> = BTreeMap::new();
    for (account, usage) in report {
        let users = merged.entry(account.to_lowercase()).or_default();
        for (user, quotas) in usage.users {
            let entry = users.entry(user).or_default();
            *entry = *entry + quotas;
        }
    }
    merged
        .into_iter()
        .map(|(account, users)| (account, AccountUsage::from_users(users)))
        .collect()
}
