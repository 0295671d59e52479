use std::process::Output;

use async_trait::async_trait;
use domain_accounting::{
    exception::BatchError,
    service::{ExecOptions, RemoteExecutor},
};
use serde::Deserialize;
use tokio::process::Command;

/// The line ssh prints for every connection when known hosts go to `/dev/null`.
const HOST_WARNING_PREFIX: &str = "Warning: Permanently added";

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "SshConfig::default_username")]
    pub username: String,
    #[serde(default = "SshConfig::default_port")]
    pub port: u16,
    #[serde(default = "SshConfig::default_key_path")]
    pub key_path: String,
}

impl SshConfig {
    pub fn default_username() -> String {
        "root".to_string()
    }
    pub fn default_port() -> u16 {
        22
    }
    pub fn default_key_path() -> String {
        "~/.ssh/id_rsa".to_string()
    }
}

/// An ssh proxy for accounting commands. It's transparent if not using ssh:
/// the command then runs through the local shell.
#[derive(Debug, Default)]
pub struct SshProxy {
    ssh: Option<SshConfig>,
}

impl SshProxy {
    pub fn new(ssh: Option<SshConfig>) -> Self {
        Self { ssh }
    }

    #[inline]
    pub fn is_proxy(&self) -> bool {
        self.ssh.is_some()
    }

    /// The shell line run on the target host. Every token is one argument,
    /// quoted unless it is made of plain characters.
    pub fn command_line(command: &[String], sudo: bool) -> String {
        let line = command
            .iter()
            .map(|token| shell_quote(token))
            .collect::<Vec<_>>()
            .join(" ");
        if sudo {
            format!("sudo {line}")
        } else {
            line
        }
    }

    /// Return the command over ssh if using ssh,
    /// or a local `sh -c` running the same line.
    pub fn command(&self, command: &[String], sudo: bool) -> Command {
        let line = Self::command_line(command, sudo);
        let Some(ssh) = &self.ssh else {
            let mut local = Command::new("sh");
            local.arg("-c").arg(line);
            return local;
        };

        let mut remote = Command::new("ssh");
        remote
            .args([
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "StrictHostKeyChecking=no",
            ])
            .arg(format!("{}@{}", ssh.username, ssh.host))
            .arg("-p")
            .arg(ssh.port.to_string())
            .arg("-i")
            .arg(&ssh.key_path)
            .arg(line);
        remote
    }

    fn program(&self) -> &'static str {
        if self.is_proxy() {
            "ssh"
        } else {
            "sh"
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshProxy {
    async fn run(&self, command: &[String], options: ExecOptions) -> Result<String, BatchError> {
        let line = Self::command_line(command, options.sudo);
        tracing::debug!(command = %line, proxy = self.is_proxy(), "Executing accounting command");

        let mut child = self.command(command, options.sudo);
        child.kill_on_drop(true);
        let output = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.output())
                .await
                .map_err(|_| BatchError::Timeout {
                    command: line.clone(),
                    timeout,
                })?,
            None => child.output().await,
        }
        .map_err(|source| BatchError::Spawn {
            program: self.program().to_string(),
            source,
        })?;

        collect_output(&line, output)
    }
}

fn collect_output(line: &str, output: Output) -> Result<String, BatchError> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&strip_host_warning(&stderr));

    if output.status.success() {
        return Ok(text);
    }
    let message = text.trim();
    let message = if message.is_empty() {
        format!("`{line}` terminated with an exception. Exit status: {}", output.status)
    } else {
        message.to_string()
    };
    Err(BatchError::Failed { message })
}

/// Single-quote `token` for a POSIX shell unless every character is inert.
pub fn shell_quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=,:@%+".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// Drop the first line when it is ssh's host-key warning.
pub fn strip_host_warning(text: &str) -> String {
    match text.split_once('\n') {
        Some((first, rest)) if first.starts_with(HOST_WARNING_PREFIX) => rest.to_string(),
        None if text.starts_with(HOST_WARNING_PREFIX) => String::new(),
        _ => text.to_string(),
    }
}
