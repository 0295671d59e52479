//! Usage report lines printed by the cluster accounting tools.

mod moab;
mod slurm;

use std::collections::HashMap;

use csv::StringRecord;
use domain_accounting::model::vo::{report, Quotas, ResourceLimits, UsageReport};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Deserialize;

pub use moab::MoabReportLine;
pub use slurm::SlurmReportLine;

static NUMBER_WITH_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)([KMGT]?)$").unwrap());

/// Parse a number with an optional binary unit suffix (`K`, `M`, `G`, `T`),
/// truncating the scaled value to an integer.
///
/// Never fails: a value that isn't entirely such a number is `0`, and values
/// too large for `u64` saturate.
pub fn parse_int(value: &str) -> u64 {
    let Some(captures) = NUMBER_WITH_UNIT.captures(value.trim()) else {
        return 0;
    };
    let Ok(number) = captures[1].parse::<Decimal>() else {
        return u64::MAX;
    };
    let shift = match &captures[2] {
        "K" => 10,
        "M" => 20,
        "G" => 30,
        "T" => 40,
        _ => 0,
    };
    number
        .checked_mul(Decimal::from(1u64 << shift))
        .and_then(|scaled| scaled.trunc().to_u64())
        .unwrap_or(u64::MAX)
}

/// Whole minutes of a `[D-][HH:]MM:SS[.fff]` duration. Unparsable input is `0`.
pub fn parse_duration(value: &str) -> u64 {
    duration_seconds(value.trim()).map(|s| s / 60).unwrap_or(0)
}

fn duration_seconds(value: &str) -> Option<u64> {
    let (days, clock) = match value.split_once('-') {
        Some((days, clock)) => (days.parse::<u64>().ok()?, clock),
        None => (0, value),
    };
    let parts: Vec<&str> = clock.split(':').collect();
    let (seconds, rest) = match parts.as_slice() {
        [rest @ .., seconds] if (1..=2).contains(&rest.len()) => (*seconds, rest),
        _ => return None,
    };
    let whole_seconds = seconds.split('.').next()?.parse::<u64>().ok()?;
    let mut total = days * 86_400 + whole_seconds;
    for (part, scale) in rest.iter().rev().zip([60, 3_600]) {
        total += part.parse::<u64>().ok()? * scale;
    }
    Some(total)
}

/// Parse a `key=value,key=value` TRES string, applying [`parse_int`] to values.
pub fn parse_resources(value: &str) -> HashMap<String, u64> {
    value
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), parse_int(value)))
        .collect()
}

/// Parse `GrpTRES` limits. Memory is kept in megabytes, the unit `sacctmgr`
/// accepts when limits are set.
pub fn parse_tres_limits(value: &str) -> ResourceLimits {
    let mut limits = ResourceLimits::default();
    for (key, raw) in value.split(',').filter_map(|pair| pair.split_once('=')) {
        match key.trim() {
            "cpu" => limits.cpu = parse_int(raw),
            "gres/gpu" => limits.gpu = parse_int(raw),
            "mem" => limits.ram = parse_megabytes(raw),
            _ => {}
        }
    }
    limits
}

fn parse_megabytes(value: &str) -> u64 {
    let value = value.trim();
    if value.ends_with(|c: char| c.is_ascii_digit()) {
        parse_int(value)
    } else {
        parse_int(value) >> 20
    }
}

/// One usage record of an accounting report.
pub trait ReportLine {
    fn account(&self) -> &str;
    fn user(&self) -> &str;
    fn cpu(&self) -> u64;
    fn gpu(&self) -> u64;
    fn ram(&self) -> u64;
    fn node(&self) -> u64;
    /// Minutes.
    fn duration(&self) -> u64;

    fn charge(&self) -> Decimal {
        Decimal::ZERO
    }

    fn quotas(&self) -> Quotas {
        let factor = self.duration().saturating_mul(self.node());
        Quotas::new(
            self.cpu().saturating_mul(factor),
            self.gpu().saturating_mul(factor),
            self.ram().saturating_mul(factor),
        )
        .with_deposit(self.charge())
    }
}

/// Batch scheduler flavour, deciding both the commands and the report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Slurm,
    Moab,
}

impl SchedulerKind {
    /// Parse every usable line of `text`.
    pub fn parse_lines(self, text: &str) -> Vec<Box<dyn ReportLine + Send>> {
        let records = pipe_records(text);
        match self {
            SchedulerKind::Slurm => records
                .iter()
                .filter_map(SlurmReportLine::from_record)
                .map(|line| Box::new(line) as Box<dyn ReportLine + Send>)
                .collect(),
            SchedulerKind::Moab => records
                .iter()
                .filter_map(MoabReportLine::from_record)
                .map(|line| Box::new(line) as Box<dyn ReportLine + Send>)
                .collect(),
        }
    }

    /// Parse `text` and group it by account and user.
    pub fn parse_report(self, text: &str) -> UsageReport {
        report::aggregate(self.parse_lines(text).into_iter().map(|line| {
            (
                line.account().to_string(),
                line.user().to_string(),
                line.quotas(),
            )
        }))
    }
}

/// Split `|` separated output into records. Blank lines are dropped.
pub(crate) fn pipe_records(text: &str) -> Vec<StringRecord> {
    csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes())
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping unreadable report line: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn parse_int_units() {
        assert_eq!(parse_int("5K"), 5 * 1024);
        assert_eq!(parse_int("2M"), 2 * (1 << 20));
        assert_eq!(parse_int("3G"), 3 * (1 << 30));
        assert_eq!(parse_int("1T"), 1 << 40);
        assert_eq!(parse_int("7"), 7);
        assert_eq!(parse_int("garbage"), 0);
        assert_eq!(parse_int(""), 0);
    }

    #[test]
    fn parse_int_takes_the_whole_value() {
        assert_eq!(parse_int("1.5G"), 3 * (1 << 29));
        assert_eq!(parse_int("0.5K"), 512);
        assert_eq!(parse_int("7.9"), 7);
        assert_eq!(parse_int("12abc"), 0);
        assert_eq!(parse_int("5KB"), 0);
        assert_eq!(parse_int("1.G"), 0);
        assert_eq!(parse_int("99999999999999999999T"), u64::MAX);
    }

    #[test]
    fn parse_duration_minutes() {
        assert_eq!(parse_duration("00:01:00"), 1);
        assert_eq!(parse_duration("01:30:00"), 90);
        assert_eq!(parse_duration("00:00:59"), 0);
        assert_eq!(parse_duration("1-00:02:00"), 1442);
        assert_eq!(parse_duration("02:30"), 2);
        assert_eq!(parse_duration("00:10:05.250"), 10);
        assert_eq!(parse_duration("Unknown"), 0);
        assert_eq!(parse_duration("1:2:3:4"), 0);
    }

    #[test]
    fn resources_default_to_zero() {
        let resources = parse_resources("cpu=2,mem=51200M,billing=4");
        assert_eq!(resources["cpu"], 2);
        assert_eq!(resources["mem"], 51200 << 20);
        assert!(!resources.contains_key("node"));
    }

    #[test]
    fn tres_limits_keep_megabytes() {
        assert_eq!(
            parse_tres_limits("cpu=100,gres/gpu=4,mem=51200"),
            ResourceLimits {
                cpu: 100,
                gpu: 4,
                ram: 51200
            }
        );
        assert_eq!(parse_tres_limits("mem=50G").ram, 51200);
        assert!(parse_tres_limits("").is_empty());
    }

    #[test]
    fn report_groups_by_account_and_user() {
        let text = indoc! {"
            allocation1|cpu=1,mem=51200M,node=1,gres/gpu=1|00:01:00|user1|
            allocation1|cpu=2,mem=51200M,node=2,gres/gpu=2|00:02:00|user2|

            allocation2|cpu=1,node=1|00:10:00|user1|
        "};
        let report = SchedulerKind::Slurm.parse_report(text);
        assert_eq!(report.len(), 2);
        let first = &report["allocation1"];
        assert_eq!(first.users["user1"], Quotas::new(1, 1, 51200 << 20));
        assert_eq!(first.users["user2"], Quotas::new(8, 8, (51200u64 << 20) * 4));
        assert_eq!(first.total, Quotas::new(9, 9, 5 * (51200u64 << 20)));
        assert_eq!(report["allocation2"].total, Quotas::new(10, 0, 0));
    }
}
