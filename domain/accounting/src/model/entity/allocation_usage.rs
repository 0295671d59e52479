use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::vo::Quotas;

/// Monthly usage snapshot of an allocation, unique per (allocation, year, month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationUsage {
    pub id: Uuid,
    pub allocation_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub cpu_usage: u64,
    pub gpu_usage: u64,
    pub ram_usage: u64,
    #[serde(default)]
    pub deposit_usage: Decimal,
}

impl AllocationUsage {
    pub fn new(allocation_id: Uuid, year: i32, month: u32, usage: &Quotas) -> Self {
        Self {
            id: Uuid::new_v4(),
            allocation_id,
            year,
            month,
            cpu_usage: usage.cpu,
            gpu_usage: usage.gpu,
            ram_usage: usage.ram,
            deposit_usage: usage.deposit,
        }
    }
}

/// Per-user slice of an [`AllocationUsage`], unique per (allocation usage, username).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationUserUsage {
    pub id: Uuid,
    pub allocation_usage_id: Uuid,
    pub username: String,
    /// Local user, when the username is known.
    pub user_id: Option<Uuid>,
    pub cpu_usage: u64,
    pub gpu_usage: u64,
    pub ram_usage: u64,
    #[serde(default)]
    pub deposit_usage: Decimal,
}

impl AllocationUserUsage {
    pub fn new(
        allocation_usage_id: Uuid,
        username: impl Into<String>,
        user_id: Option<Uuid>,
        usage: &Quotas,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            allocation_usage_id,
            username: username.into(),
            user_id,
            cpu_usage: usage.cpu,
            gpu_usage: usage.gpu,
            ram_usage: usage.ram,
            deposit_usage: usage.deposit,
        }
    }
}
