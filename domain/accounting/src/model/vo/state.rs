use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    #[default]
    CreationScheduled,
    Creating,
    Ok,
    Updating,
    Erred,
    DeletionScheduled,
    Deleting,
}

impl AllocationState {
    /// Whether `self -> to` is a legal move.
    ///
    /// Any state may fall into `Erred`, and a successful pull recovers an
    /// erred allocation back to `Ok`. An erred creation may be scheduled again.
    pub fn can_transition_to(self, to: AllocationState) -> bool {
        use AllocationState::*;
        match (self, to) {
            (Erred, Erred) => false,
            (_, Erred) => true,
            _ => matches!(
                (self, to),
                (CreationScheduled, Creating)
                    | (Creating, Ok)
                    | (Ok, Updating)
                    | (Updating, Ok)
                    | (Erred, Ok)
                    | (Erred, CreationScheduled)
                    | (Ok | Erred, DeletionScheduled)
                    | (DeletionScheduled, Deleting)
            ),
        }
    }

    /// States in which the allocation is known to exist on the cluster.
    pub fn is_stable(self) -> bool {
        matches!(self, AllocationState::Ok | AllocationState::Erred)
    }
}

impl fmt::Display for AllocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationState::CreationScheduled => "creation-scheduled",
            AllocationState::Creating => "creating",
            AllocationState::Ok => "ok",
            AllocationState::Updating => "updating",
            AllocationState::Erred => "erred",
            AllocationState::DeletionScheduled => "deletion-scheduled",
            AllocationState::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::AllocationState::*;

    #[test]
    fn creation_path() {
        assert!(CreationScheduled.can_transition_to(Creating));
        assert!(Creating.can_transition_to(Ok));
        assert!(!CreationScheduled.can_transition_to(Ok));
    }

    #[test]
    fn update_cycle() {
        assert!(Ok.can_transition_to(Updating));
        assert!(Updating.can_transition_to(Ok));
        assert!(!Erred.can_transition_to(Updating));
    }

    #[test]
    fn deletion_path() {
        assert!(Ok.can_transition_to(DeletionScheduled));
        assert!(Erred.can_transition_to(DeletionScheduled));
        assert!(DeletionScheduled.can_transition_to(Deleting));
        assert!(!Creating.can_transition_to(DeletionScheduled));
        assert!(Deleting.can_transition_to(Erred));
    }

    #[test]
    fn erred_and_recovery() {
        assert!(Ok.can_transition_to(Erred));
        assert!(!Erred.can_transition_to(Erred));
        assert!(Erred.can_transition_to(Ok));
        assert!(!Erred.can_transition_to(Creating));
        assert!(Erred.can_transition_to(CreationScheduled));
        assert!(!Ok.can_transition_to(CreationScheduled));
    }
}
