use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exception::{AccountingException, AccountingResult};
use crate::model::vo::{AllocationState, Quotas, ResourceLimits};

/// A cluster account provisioned for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Uuid,
    pub name: String,
    /// Account name on the cluster. Empty until provisioned.
    #[serde(default)]
    pub backend_id: String,
    #[serde(default)]
    pub state: AllocationState,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub is_active: bool,
    pub project_id: Uuid,
    #[serde(default)]
    pub cpu_usage: u64,
    #[serde(default)]
    pub gpu_usage: u64,
    #[serde(default)]
    pub ram_usage: u64,
    #[serde(default)]
    pub cpu_limit: u64,
    #[serde(default)]
    pub gpu_limit: u64,
    #[serde(default)]
    pub ram_limit: u64,
}

impl Allocation {
    /// The remote account name, or a typed error for unprovisioned allocations.
    pub fn backend_id(&self) -> AccountingResult<&str> {
        if self.backend_id.trim().is_empty() {
            return Err(AccountingException::MissingBackendId { id: self.id });
        }
        Ok(self.backend_id.as_str())
    }

    pub fn usage(&self) -> Quotas {
        Quotas::new(self.cpu_usage, self.gpu_usage, self.ram_usage)
    }

    /// Writes usage counters and returns whether any of them changed.
    pub fn apply_usage(&mut self, usage: &Quotas) -> bool {
        let before = self.usage();
        self.cpu_usage = usage.cpu;
        self.gpu_usage = usage.gpu;
        self.ram_usage = usage.ram;
        before != self.usage()
    }

    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu: self.cpu_limit,
            gpu: self.gpu_limit,
            ram: self.ram_limit,
        }
    }

    pub fn apply_limits(&mut self, limits: &ResourceLimits) -> bool {
        let before = self.limits();
        self.cpu_limit = limits.cpu;
        self.gpu_limit = limits.gpu;
        self.ram_limit = limits.ram;
        before != *limits
    }

    pub fn transition(&mut self, to: AllocationState) -> AccountingResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(AccountingException::InvalidTransition {
                id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        if to != AllocationState::Erred {
            self.error_message.clear();
        }
        Ok(())
    }

    /// Records a failure. Repeated failures only refresh the message.
    pub fn set_erred(&mut self, message: impl Into<String>) {
        self.state = AllocationState::Erred;
        self.error_message = message.into();
    }
}
