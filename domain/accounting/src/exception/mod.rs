use thiserror::Error;
use uuid::Uuid;

use crate::model::vo::AllocationState;

pub type AccountingResult<T> = Result<T, AccountingException>;

/// Failure of a single remote command.
#[derive(Error, Debug)]
pub enum BatchError {
    /// The command exited with a non-zero status. The message is the command
    /// output without the ssh host-key warning line.
    #[error("{message}")]
    Failed { message: String },

    #[error("Unable to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` timed out after {timeout:?}.")]
    Timeout {
        command: String,
        timeout: std::time::Duration,
    },
}

#[derive(Error, Debug)]
pub enum AccountingException {
    #[error("{source}")]
    Batch {
        #[from]
        source: BatchError,
    },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Allocation {id} doesn't have backend_id.")]
    MissingBackendId { id: Uuid },

    #[error("There is no allocation with id: {id}.")]
    AllocationNotFound { id: Uuid },

    #[error("Allocation {id} can't move from {from} to {to}.")]
    InvalidTransition {
        id: Uuid,
        from: AllocationState,
        to: AllocationState,
    },

    #[error("Accounting internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AccountingException {
    fn from(e: anyhow::Error) -> Self {
        AccountingException::InternalError { source: e }
    }
}

impl AccountingException {
    pub fn backend(message: impl Into<String>) -> Self {
        AccountingException::Backend {
            message: message.into(),
        }
    }
}
