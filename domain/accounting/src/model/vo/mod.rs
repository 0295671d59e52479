pub mod account;
pub mod limits;
pub mod quotas;
pub mod report;
pub mod scope;
pub mod state;

#[rustfmt::skip]
pub use {
    account::Account,
    limits::ResourceLimits,
    quotas::Quotas,
    report::{AccountUsage, UsageReport},
    scope::{Scope, ScopeUsage},
    state::AllocationState,
};
