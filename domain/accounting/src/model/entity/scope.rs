use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::vo::ScopeUsage;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub usage: ScopeUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    #[serde(default)]
    pub usage: ScopeUsage,
}
