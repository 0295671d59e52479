use std::{path::PathBuf, time::Duration};

use domain_accounting::{model::vo::ResourceLimits, service::ExecOptions};
use infrastructure_command::SshConfig;
use serde::Deserialize;
use service_accounting::{AccountNaming, SchedulerKind};

use crate::telemetry::TelemetryConfig;

/// Layers `config.yaml`, yaml files given on the command line and
/// `ACCOUNTING__*` environment variables, later ones winning.
pub fn build_config() -> anyhow::Result<::config::Config> {
    let args = std::env::args()
        .skip(1)
        .filter(|arg| arg.ends_with(".yaml") || arg.ends_with(".yml"));
    let mut builder = ::config::Config::builder().add_source(
        ::config::File::with_name("config")
            .format(::config::FileFormat::Yaml)
            .required(false),
    );
    for arg in args {
        builder = builder.add_source(::config::File::with_name(&arg));
    }
    let config = builder
        .add_source(
            ::config::Environment::with_prefix("ACCOUNTING")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(config)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountingConfig {
    #[serde(default)]
    pub ssh: SshSection,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Where accounting commands run. Without a host they run locally.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "SshConfig::default_username")]
    pub username: String,
    #[serde(default = "SshConfig::default_port")]
    pub port: u16,
    #[serde(default = "SshConfig::default_key_path")]
    pub key_path: String,
    #[serde(default)]
    pub use_sudo: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            host: None,
            username: SshConfig::default_username(),
            port: SshConfig::default_port(),
            key_path: SshConfig::default_key_path(),
            use_sudo: false,
            timeout_secs: None,
        }
    }
}

impl SshSection {
    pub fn ssh_config(&self) -> Option<SshConfig> {
        self.host.as_ref().filter(|host| !host.is_empty()).map(|host| SshConfig {
            host: host.clone(),
            username: self.username.clone(),
            port: self.port,
            key_path: self.key_path.clone(),
        })
    }

    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            sudo: self.use_sudo,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default, rename = "type")]
    pub kind: SchedulerKind,
    #[serde(default = "SchedulerConfig::default_account")]
    pub default_account: String,
    #[serde(default = "SchedulerConfig::default_prefix")]
    pub organization_prefix: String,
    #[serde(default = "SchedulerConfig::default_prefix")]
    pub project_prefix: String,
    #[serde(default = "SchedulerConfig::default_prefix")]
    pub allocation_prefix: String,
    #[serde(default)]
    pub default_limits: ResourceLimits,
}

impl SchedulerConfig {
    pub fn default_account() -> String {
        "waldur".to_string()
    }
    pub fn default_prefix() -> String {
        "hpc_".to_string()
    }

    pub fn naming(&self) -> AccountNaming {
        AccountNaming::builder()
            .default_account(self.default_account.as_str())
            .organization_prefix(self.organization_prefix.as_str())
            .project_prefix(self.project_prefix.as_str())
            .allocation_prefix(self.allocation_prefix.as_str())
            .build()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::default(),
            default_account: Self::default_account(),
            organization_prefix: Self::default_prefix(),
            project_prefix: Self::default_prefix(),
            allocation_prefix: Self::default_prefix(),
            default_limits: ResourceLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_interval_secs")]
    pub interval_secs: u64,
    /// Directory of the JSON record files.
    #[serde(default = "SyncConfig::default_data_dir")]
    pub data_dir: PathBuf,
}

impl SyncConfig {
    pub fn default_interval_secs() -> u64 {
        3600
    }
    pub fn default_data_dir() -> PathBuf {
        PathBuf::from(".")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            data_dir: Self::default_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(yaml: &str) -> AccountingConfig {
        ::config::Config::builder()
            .add_source(::config::File::from_str(yaml, ::config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("{}");
        assert!(config.ssh.ssh_config().is_none());
        assert_eq!(config.ssh.exec_options(), ExecOptions::default());
        assert_eq!(config.scheduler.kind, SchedulerKind::Slurm);
        assert_eq!(config.scheduler.default_account, "waldur");
        assert_eq!(config.sync.interval(), Duration::from_secs(3600));
        assert!(config.telemetry.enable);
    }

    #[test]
    fn sections_are_read() {
        let config = parse(indoc! {"
            ssh:
              host: head.cluster
              port: 2222
              use_sudo: true
              timeout_secs: 30
            scheduler:
              type: moab
              project_prefix: prj_
              default_limits:
                cpu: 1000
            sync:
              interval_secs: 60
              data_dir: /var/lib/accounting
        "});

        let ssh = config.ssh.ssh_config().unwrap();
        assert_eq!(ssh.host, "head.cluster");
        assert_eq!(ssh.username, "root");
        assert_eq!(ssh.port, 2222);
        assert_eq!(
            config.ssh.exec_options(),
            ExecOptions {
                sudo: true,
                timeout: Some(Duration::from_secs(30)),
            }
        );
        assert_eq!(config.scheduler.kind, SchedulerKind::Moab);
        assert_eq!(config.scheduler.default_limits.cpu, 1000);
        assert_eq!(config.scheduler.default_limits.ram, 0);
        let naming = config.scheduler.naming();
        assert_eq!(naming.project_prefix, "prj_");
        assert_eq!(naming.allocation_prefix, "hpc_");
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.data_dir, PathBuf::from("/var/lib/accounting"));
    }
}
