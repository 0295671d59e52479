use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Quotas;

/// A quota scope allocations roll their usage up into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Project(Uuid),
    Organization(Uuid),
}

/// Usage counters cached on a scope, read by billing and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeUsage {
    pub nc_cpu_usage: u64,
    pub nc_gpu_usage: u64,
    pub nc_ram_usage: u64,
}

impl From<Quotas> for ScopeUsage {
    fn from(q: Quotas) -> Self {
        Self {
            nc_cpu_usage: q.cpu,
            nc_gpu_usage: q.gpu,
            nc_ram_usage: q.ram,
        }
    }
}
