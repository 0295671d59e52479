use std::str::FromStr;

use csv::StringRecord;
use rust_decimal::Decimal;

use super::{parse_int, ReportLine};

/// `mam-list-usagerecords` line:
/// `account|user|processors|gpus|memory|nodes|duration_seconds|charge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoabReportLine {
    account: String,
    user: String,
    cpu: u64,
    gpu: u64,
    ram: u64,
    node: u64,
    duration: u64,
    charge: Decimal,
}

impl MoabReportLine {
    const FIELDS: usize = 8;

    pub fn from_record(record: &StringRecord) -> Option<Self> {
        if record.len() < Self::FIELDS {
            tracing::warn!(
                "Skipping usage record with {} fields: {}",
                record.len(),
                record.iter().collect::<Vec<_>>().join("|")
            );
            return None;
        }
        let seconds = parse_int(&record[6]);
        Some(Self {
            account: record[0].trim().to_string(),
            user: record[1].trim().to_string(),
            cpu: parse_int(&record[2]),
            gpu: parse_int(&record[3]),
            ram: parse_int(&record[4]),
            node: parse_int(&record[5]),
            duration: seconds.div_ceil(60),
            charge: Decimal::from_str(record[7].trim()).unwrap_or_default(),
        })
    }
}

impl ReportLine for MoabReportLine {
    fn account(&self) -> &str {
        &self.account
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn cpu(&self) -> u64 {
        self.cpu
    }

    fn gpu(&self) -> u64 {
        self.gpu
    }

    fn ram(&self) -> u64 {
        self.ram
    }

    fn node(&self) -> u64 {
        self.node
    }

    fn duration(&self) -> u64 {
        self.duration
    }

    fn charge(&self) -> Decimal {
        self.charge
    }
}
