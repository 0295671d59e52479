use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission of a cluster user to submit jobs against an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: Uuid,
    pub allocation_id: Uuid,
    pub username: String,
}

impl Association {
    pub fn new(allocation_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            allocation_id,
            username: username.into(),
        }
    }
}
