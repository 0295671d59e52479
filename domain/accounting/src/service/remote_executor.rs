use std::time::Duration;

use async_trait::async_trait;

use crate::exception::BatchError;

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Prefix the command with `sudo`.
    pub sudo: bool,
    /// Give up waiting after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Runs one command on the cluster head node.
///
/// `command` is an argument vector: the executor quotes each element, so
/// callers never quote values themselves.
///
/// No retries are attempted; retry policy belongs to the caller.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Return the combined output of `command`, or the failure with the
    /// command's output as its message.
    async fn run(&self, command: &[String], options: ExecOptions) -> Result<String, BatchError>;
}
