use std::collections::HashMap;

use csv::StringRecord;

use super::{parse_duration, parse_resources, ReportLine};

/// `sacct` output line: `account|ReqTRES|Elapsed|user|...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmReportLine {
    account: String,
    user: String,
    resources: HashMap<String, u64>,
    duration: u64,
}

impl SlurmReportLine {
    const FIELDS: usize = 4;

    pub fn from_record(record: &StringRecord) -> Option<Self> {
        if record.len() < Self::FIELDS {
            tracing::warn!(
                "Skipping sacct line with {} fields: {}",
                record.len(),
                record.iter().collect::<Vec<_>>().join("|")
            );
            return None;
        }
        Some(Self {
            account: record[0].trim().to_string(),
            user: record[3].to_string(),
            resources: parse_resources(&record[1]),
            duration: parse_duration(&record[2]),
        })
    }

    fn resource(&self, key: &str) -> u64 {
        self.resources.get(key).copied().unwrap_or(0)
    }
}

impl ReportLine for SlurmReportLine {
    fn account(&self) -> &str {
        &self.account
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn cpu(&self) -> u64 {
        self.resource("cpu")
    }

    fn gpu(&self) -> u64 {
        self.resource("gres/gpu")
    }

    fn ram(&self) -> u64 {
        self.resource("mem")
    }

    fn node(&self) -> u64 {
        self.resource("node")
    }

    fn duration(&self) -> u64 {
        self.duration
    }
}
