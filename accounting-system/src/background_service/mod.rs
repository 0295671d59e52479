pub mod interval_runner;

use async_trait::async_trait;

/// A long-running task spawned at startup.
#[async_trait]
pub trait BackgroundService: Send + Sync {
    async fn run(&self);
}
