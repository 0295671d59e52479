mod accounting_backend;
mod allocation_provision;
mod allocation_sync;
mod remote_executor;
mod scope_quota;

#[rustfmt::skip]
pub use self::{
    accounting_backend::AccountingBackend,
    allocation_provision::AllocationProvisionService,
    allocation_sync::{AllocationSyncService, AssociationChanges, SyncSummary},
    remote_executor::{ExecOptions, RemoteExecutor},
    scope_quota::ScopeQuotaService,
};
