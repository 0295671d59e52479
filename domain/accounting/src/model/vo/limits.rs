use std::fmt;

use serde::{Deserialize, Serialize};

/// Group TRES limits of a cluster account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub cpu: u64,
    pub gpu: u64,
    pub ram: u64,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu == 0 && self.gpu == 0 && self.ram == 0
    }
}

/// Renders the `GrpTRES` value understood by `sacctmgr`.
impl fmt::Display for ResourceLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu={},gres/gpu={},mem={}", self.cpu, self.gpu, self.ram)
    }
}
