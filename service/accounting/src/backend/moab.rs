use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain_accounting::{
    exception::AccountingResult,
    model::vo::{Account, ResourceLimits, UsageReport},
    service::{AccountingBackend, ExecOptions, RemoteExecutor},
};
use typed_builder::TypedBuilder;

use super::{current_period, parse_accounts, tokens};
use crate::report::{pipe_records, SchedulerKind};

const ACCOUNT_FIELDS: &str = "Name,Description,Organization";
const USAGE_FIELDS: &str = "Account,User,Processors,GPUs,Memory,Nodes,Duration,Charge";

/// Accounting through the Moab Accounting Manager `mam-*` commands.
///
/// MAM accounts are flat and funded with credits, so there is no account
/// hierarchy and the CPU limit is deposited as the credit amount.
#[derive(TypedBuilder)]
pub struct MoabBackend {
    executor: Arc<dyn RemoteExecutor>,
    #[builder(default)]
    options: ExecOptions,
}

impl MoabBackend {
    async fn mam(&self, program: &str, args: &[&str]) -> AccountingResult<String> {
        let command = tokens(program, args.iter().copied());
        Ok(self.executor.run(&command, self.options).await?)
    }
}

#[async_trait]
impl AccountingBackend for MoabBackend {
    async fn ping(&self, raise: bool) -> AccountingResult<bool> {
        match self.list_accounts().await {
            Ok(_) => Ok(true),
            Err(e) if raise => Err(e),
            Err(e) => {
                tracing::warn!("Moab accounting manager is not reachable: {e}");
                Ok(false)
            }
        }
    }

    async fn list_accounts(&self) -> AccountingResult<Vec<Account>> {
        let out = self
            .mam("mam-list-accounts", &["--raw", "--quiet", "--show", ACCOUNT_FIELDS])
            .await?;
        Ok(parse_accounts(&out))
    }

    async fn get_account(&self, name: &str) -> AccountingResult<Option<Account>> {
        let out = self
            .mam(
                "mam-list-accounts",
                &["--raw", "--quiet", "--show", ACCOUNT_FIELDS, "-a", name],
            )
            .await?;
        Ok(parse_accounts(&out)
            .into_iter()
            .find(|account| account.name.eq_ignore_ascii_case(name)))
    }

    async fn create_account(
        &self,
        account: &Account,
        parent: Option<&str>,
    ) -> AccountingResult<()> {
        if let Some(parent) = parent {
            tracing::debug!("Moab accounts are flat, ignoring parent {parent}");
        }
        self.mam(
            "mam-create-account",
            &[
                "-a",
                &account.name,
                "-d",
                &account.description,
                "-o",
                &account.organization,
            ],
        )
        .await?;
        self.mam("mam-create-fund", &["-a", &account.name]).await?;
        tracing::info!("Created moab account {}", account.name);
        Ok(())
    }

    async fn delete_account(&self, name: &str) -> AccountingResult<()> {
        self.mam("mam-delete-account", &["-a", name]).await?;
        tracing::info!("Removed moab account {name}");
        Ok(())
    }

    async fn list_child_accounts(&self, _name: &str) -> AccountingResult<Vec<String>> {
        Ok(vec![])
    }

    async fn set_resource_limits(
        &self,
        account: &str,
        limits: &ResourceLimits,
    ) -> AccountingResult<()> {
        let credits = limits.cpu.to_string();
        self.mam("mam-deposit", &["-a", account, "-z", &credits]).await?;
        Ok(())
    }

    async fn get_resource_limits(&self, _account: &str) -> AccountingResult<Option<ResourceLimits>> {
        Ok(None)
    }

    async fn list_account_users(&self, account: &str) -> AccountingResult<Vec<String>> {
        let out = self
            .mam(
                "mam-list-accounts",
                &["--raw", "--quiet", "--show", "Users", "-a", account],
            )
            .await?;
        let users: BTreeSet<String> = pipe_records(&out)
            .iter()
            .flat_map(|r| r.iter().flat_map(|f| f.split(',')).map(str::trim).collect::<Vec<_>>())
            .filter(|user| !user.is_empty())
            .map(str::to_string)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn add_user(&self, account: &str, username: &str) -> AccountingResult<()> {
        self.mam("mam-modify-account", &["--add-user", username, "-a", account])
            .await?;
        tracing::info!("Associated user {username} with moab account {account}");
        Ok(())
    }

    async fn delete_user(&self, account: &str, username: &str) -> AccountingResult<()> {
        self.mam("mam-modify-account", &["--del-user", username, "-a", account])
            .await?;
        tracing::info!("Removed user {username} from moab account {account}");
        Ok(())
    }

    async fn get_usage_report(&self, accounts: &[String]) -> AccountingResult<UsageReport> {
        if accounts.is_empty() {
            return Ok(UsageReport::new());
        }
        let (start, end) = current_period(Utc::now());
        let out = self
            .mam(
                "mam-list-usagerecords",
                &["--raw", "--quiet", "--show", USAGE_FIELDS, "-s", &start, "-e", &end],
            )
            .await?;
        let wanted: BTreeSet<String> = accounts.iter().map(|a| a.to_lowercase()).collect();
        let mut report = SchedulerKind::Moab.parse_report(&out);
        report.retain(|account, _| wanted.contains(&account.to_lowercase()));
        Ok(report)
    }
}
