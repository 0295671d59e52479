use std::collections::BTreeMap;

use super::Quotas;

/// Usage of one account for the reporting period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUsage {
    /// Sum of every user's usage (`TOTAL_ACCOUNT_USAGE`).
    pub total: Quotas,
    pub users: BTreeMap<String, Quotas>,
}

impl AccountUsage {
    pub fn from_users(users: BTreeMap<String, Quotas>) -> Self {
        Self {
            total: users.values().sum(),
            users,
        }
    }
}

/// Usage grouped by account name.
pub type UsageReport = BTreeMap<String, AccountUsage>;

/// Groups `(account, user, quotas)` records by account, then by user, and
/// folds each group with `+`. The result does not depend on input order.
pub fn aggregate<I>(records: I) -> UsageReport
where
    I: IntoIterator<Item = (String, String, Quotas)>,
{
    let mut grouped: BTreeMap<String, BTreeMap<String, Quotas>> = BTreeMap::new();
    for (account, user, quotas) in records {
        let entry = grouped.entry(account).or_default().entry(user).or_default();
        *entry = *entry + quotas;
    }
    grouped
        .into_iter()
        .map(|(account, users)| (account, AccountUsage::from_users(users)))
        .collect()
}
