use async_trait::async_trait;
use uuid::Uuid;

use crate::exception::AccountingResult;
use crate::model::vo::{Scope, ScopeUsage};

/// Rolls allocation usage up into project and organization counters.
///
/// Writes are left uncommitted; the caller ends its step with `save_changed`.
#[async_trait]
pub trait ScopeQuotaService: Send + Sync {
    /// Sum usage of every allocation in `scope` and store it on the scope.
    async fn recompute_scope_usage(&self, scope: Scope) -> AccountingResult<ScopeUsage>;

    /// Recompute the project, then the organization owning it.
    async fn propagate_from_project(&self, project_id: Uuid) -> AccountingResult<()>;
}
