//! Account management on a batch scheduler's accounting database.

use async_trait::async_trait;

use crate::exception::AccountingResult;
use crate::model::vo::{Account, ResourceLimits, UsageReport};

#[async_trait]
pub trait AccountingBackend: Send + Sync {
    /// Check the cluster answers. With `raise` the failure is returned,
    /// otherwise it is logged and `false` is returned.
    async fn ping(&self, raise: bool) -> AccountingResult<bool>;

    async fn list_accounts(&self) -> AccountingResult<Vec<Account>>;

    async fn get_account(&self, name: &str) -> AccountingResult<Option<Account>>;

    /// Create `account` under `parent`, or under the root when `parent` is `None`.
    async fn create_account(&self, account: &Account, parent: Option<&str>)
        -> AccountingResult<()>;

    async fn delete_account(&self, name: &str) -> AccountingResult<()>;

    /// Names of the accounts whose parent is `name`.
    async fn list_child_accounts(&self, name: &str) -> AccountingResult<Vec<String>>;

    async fn set_resource_limits(
        &self,
        account: &str,
        limits: &ResourceLimits,
    ) -> AccountingResult<()>;

    /// Limits of the first association of `account` that carries any.
    async fn get_resource_limits(&self, account: &str) -> AccountingResult<Option<ResourceLimits>>;

    /// Usernames associated with `account`.
    async fn list_account_users(&self, account: &str) -> AccountingResult<Vec<String>>;

    async fn add_user(&self, account: &str, username: &str) -> AccountingResult<()>;

    async fn delete_user(&self, account: &str, username: &str) -> AccountingResult<()>;

    /// Usage of the current month restricted to `accounts`.
    async fn get_usage_report(&self, accounts: &[String]) -> AccountingResult<UsageReport>;
}
