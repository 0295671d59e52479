use async_trait::async_trait;

use super::ReadOnlyRepository;
use crate::model::entity::User;

#[async_trait]
pub trait UserRepo: ReadOnlyRepository<User> + Send + Sync {
    async fn get_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
}
