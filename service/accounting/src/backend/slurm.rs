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
use crate::report::{parse_tres_limits, pipe_records, SchedulerKind};

const ACCOUNT_FORMAT: &str = "format=Account,Descr,Org";

/// Accounting through `sacctmgr` and `sacct`.
#[derive(TypedBuilder)]
pub struct SlurmBackend {
    executor: Arc<dyn RemoteExecutor>,
    #[builder(default)]
    options: ExecOptions,
}

impl SlurmBackend {
    async fn sacctmgr(&self, args: &[&str]) -> AccountingResult<String> {
        let command = tokens(
            "sacctmgr",
            ["--parsable2", "--noheader", "--immediate"]
                .into_iter()
                .chain(args.iter().copied()),
        );
        Ok(self.executor.run(&command, self.options).await?)
    }

    /// Association rows in `format`, narrowed by `filter`.
    async fn associations(&self, filter: &[&str], format: &str) -> AccountingResult<String> {
        let mut args = vec!["list", "association", format];
        args.extend_from_slice(filter);
        self.sacctmgr(&args).await
    }
}

#[async_trait]
impl AccountingBackend for SlurmBackend {
    async fn ping(&self, raise: bool) -> AccountingResult<bool> {
        match self.list_accounts().await {
            Ok(_) => Ok(true),
            Err(e) if raise => Err(e),
            Err(e) => {
                tracing::warn!("Slurm cluster is not reachable: {e}");
                Ok(false)
            }
        }
    }

    async fn list_accounts(&self) -> AccountingResult<Vec<Account>> {
        let out = self.sacctmgr(&["list", "account", ACCOUNT_FORMAT]).await?;
        Ok(parse_accounts(&out))
    }

    async fn get_account(&self, name: &str) -> AccountingResult<Option<Account>> {
        let filter = format!("name={name}");
        let out = self.sacctmgr(&["list", "account", &filter, ACCOUNT_FORMAT]).await?;
        Ok(parse_accounts(&out)
            .into_iter()
            .find(|account| account.name.eq_ignore_ascii_case(name)))
    }

    async fn create_account(
        &self,
        account: &Account,
        parent: Option<&str>,
    ) -> AccountingResult<()> {
        let description = format!("description={}", account.description);
        let organization = format!("organization={}", account.organization);
        let mut args = vec![
            "add",
            "account",
            account.name.as_str(),
            description.as_str(),
            organization.as_str(),
        ];
        let parent = parent.map(|parent| format!("parent={parent}"));
        if let Some(parent) = &parent {
            args.push(parent.as_str());
        }
        self.sacctmgr(&args).await?;
        tracing::info!("Created slurm account {}", account.name);
        Ok(())
    }

    async fn delete_account(&self, name: &str) -> AccountingResult<()> {
        let filter = format!("name={name}");
        self.sacctmgr(&["remove", "account", "where", &filter]).await?;
        tracing::info!("Removed slurm account {name}");
        Ok(())
    }

    async fn list_child_accounts(&self, name: &str) -> AccountingResult<Vec<String>> {
        let out = self.associations(&[], "format=Account,ParentName,User").await?;
        let children: BTreeSet<String> = pipe_records(&out)
            .iter()
            .filter(|r| r.len() >= 3 && r[2].trim().is_empty())
            .filter(|r| r[1].trim().eq_ignore_ascii_case(name))
            .map(|r| r[0].trim().to_string())
            .filter(|account| !account.eq_ignore_ascii_case(name))
            .collect();
        Ok(children.into_iter().collect())
    }

    async fn set_resource_limits(
        &self,
        account: &str,
        limits: &ResourceLimits,
    ) -> AccountingResult<()> {
        let limits = format!("GrpTRES={limits}");
        self.sacctmgr(&["modify", "account", account, "set", &limits]).await?;
        Ok(())
    }

    async fn get_resource_limits(&self, account: &str) -> AccountingResult<Option<ResourceLimits>> {
        let filter = format!("account={account}");
        let out = self.associations(&["where", &filter], "format=Account,User,GrpTRES").await?;
        Ok(pipe_records(&out)
            .iter()
            .filter(|r| r.len() >= 3 && !r[2].trim().is_empty())
            .map(|r| parse_tres_limits(&r[2]))
            .next())
    }

    async fn list_account_users(&self, account: &str) -> AccountingResult<Vec<String>> {
        let filter = format!("account={account}");
        let out = self.associations(&["where", &filter], "format=Account,User").await?;
        let users: BTreeSet<String> = pipe_records(&out)
            .iter()
            .filter(|r| r.len() >= 2)
            .map(|r| r[1].trim().to_string())
            .filter(|user| !user.is_empty())
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn add_user(&self, account: &str, username: &str) -> AccountingResult<()> {
        let account_arg = format!("account={account}");
        self.sacctmgr(&["add", "user", username, &account_arg]).await?;
        tracing::info!("Associated user {username} with slurm account {account}");
        Ok(())
    }

    async fn delete_user(&self, account: &str, username: &str) -> AccountingResult<()> {
        let name = format!("name={username}");
        let account_arg = format!("account={account}");
        self.sacctmgr(&["remove", "user", "where", &name, "and", &account_arg]).await?;
        tracing::info!("Removed user {username} from slurm account {account}");
        Ok(())
    }

    async fn get_usage_report(&self, accounts: &[String]) -> AccountingResult<UsageReport> {
        if accounts.is_empty() {
            return Ok(UsageReport::new());
        }
        let (start, end) = current_period(Utc::now());
        let start = format!("--starttime={start}");
        let end = format!("--endtime={end}");
        let accounts = format!("--accounts={}", accounts.join(","));
        let command = tokens(
            "sacct",
            [
                "--allusers",
                "--allocations",
                "--truncate",
                "--noconvert",
                "--parsable2",
                "--noheader",
                "--format=Account,ReqTRES,Elapsed,User",
                start.as_str(),
                end.as_str(),
                accounts.as_str(),
            ],
        );
        let out = self.executor.run(&command, self.options).await?;
        Ok(SchedulerKind::Slurm.parse_report(&out))
    }
}
