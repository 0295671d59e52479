//! Account management through the scheduler's accounting commands.

mod moab;
mod slurm;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain_accounting::{
    model::vo::Account,
    service::{AccountingBackend, ExecOptions, RemoteExecutor},
};

use crate::report::{pipe_records, SchedulerKind};

pub use moab::MoabBackend;
pub use slurm::SlurmBackend;

/// Backend matching the configured scheduler.
pub fn build_backend(
    kind: SchedulerKind,
    executor: Arc<dyn RemoteExecutor>,
    options: ExecOptions,
) -> Arc<dyn AccountingBackend> {
    match kind {
        SchedulerKind::Slurm => {
            Arc::new(SlurmBackend::builder().executor(executor).options(options).build())
        }
        SchedulerKind::Moab => {
            Arc::new(MoabBackend::builder().executor(executor).options(options).build())
        }
    }
}

pub(crate) fn tokens<'a>(program: &'a str, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    std::iter::once(program)
        .chain(args)
        .map(str::to_string)
        .collect()
}

/// `name|description|organization` rows.
pub(crate) fn parse_accounts(text: &str) -> Vec<Account> {
    pipe_records(text)
        .iter()
        .filter(|r| r.len() >= 3 && !r[0].trim().is_empty())
        .map(|r| Account {
            name: r[0].trim().to_string(),
            description: r[1].to_string(),
            organization: r[2].to_string(),
        })
        .collect()
}

/// Start of the current month and `now`, as accepted by `sacct` and `mam-*`.
pub(crate) fn current_period(now: DateTime<Utc>) -> (String, String) {
    (
        now.format("%Y-%m-01").to_string(),
        now.format("%Y-%m-%dT%H:%M:%S").to_string(),
    )
}
