use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use domain_accounting::{
    model::{entity::Allocation, vo::AllocationState},
    repository::AllocationRepo,
    service::{AllocationProvisionService, AllocationSyncService},
};
use tracing::Instrument;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::BackgroundService;

/// Periodically reconciles every allocation with the cluster.
///
/// Passes never overlap: a pass that outlives the interval delays the next.
#[derive(TypedBuilder)]
pub struct IntervalRunner {
    sync_service: Arc<dyn AllocationSyncService>,
    provision_service: Arc<dyn AllocationProvisionService>,
    allocation_repo: Arc<dyn AllocationRepo>,
    interval: Duration,
}

impl IntervalRunner {
    pub async fn reconcile(&self) {
        let allocations = match self.allocation_repo.get_all().await {
            Ok(x) => x,
            Err(e) => {
                tracing::error!("Unable to list allocations: {e:#}");
                return;
            }
        };
        self.provision_scheduled(&allocations).await;

        match self.sync_service.sync_usage().await {
            Ok(summary) => tracing::info!(
                "Usage sync updated {} allocation(s), skipped {} account(s)",
                summary.updated.len(),
                summary.skipped.len()
            ),
            Err(e) => tracing::error!("Usage sync failed: {e}"),
        }

        let active = match self.allocation_repo.get_provisioned().await {
            Ok(x) => x,
            Err(e) => {
                tracing::error!("Unable to list provisioned allocations: {e:#}");
                return;
            }
        };
        for allocation in active.iter().filter(|x| x.is_active && x.state.is_stable()) {
            if let Err(e) = self.sync_service.pull_allocation(allocation.id).await {
                self.mark_erred(allocation.id, "Pulling", &e.to_string()).await;
            }
        }
    }

    /// Carries out pending creations and deletions, and retries creations
    /// that failed before the cluster account existed.
    async fn provision_scheduled(&self, allocations: &[Allocation]) {
        for allocation in allocations {
            let retry_creation =
                allocation.state == AllocationState::Erred && allocation.backend_id().is_err();
            let result = match allocation.state {
                AllocationState::CreationScheduled => {
                    self.provision_service.create_allocation(allocation.id).await
                }
                AllocationState::Erred if retry_creation => {
                    self.provision_service.create_allocation(allocation.id).await
                }
                AllocationState::DeletionScheduled => {
                    self.provision_service.delete_allocation(allocation.id).await
                }
                _ => continue,
            };
            if let Err(e) = result {
                self.mark_erred(allocation.id, "Provisioning", &e.to_string()).await;
            }
        }
    }

    async fn mark_erred(&self, id: Uuid, step: &str, message: &str) {
        tracing::error!("{step} allocation {id} failed: {message}");
        if let Err(e) = self.provision_service.set_erred(id, message).await {
            tracing::error!("Unable to mark allocation {id} erred: {e}");
        }
    }
}

#[async_trait]
impl BackgroundService for IntervalRunner {
    async fn run(&self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.reconcile()
                .instrument(tracing::trace_span!("interval_runner"))
                .await;
        }
    }
}
