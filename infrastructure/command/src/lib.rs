//! Commands to run on cluster infrastructure.

mod ssh_proxy;

pub use ssh_proxy::{shell_quote, strip_host_warning, SshConfig, SshProxy};
