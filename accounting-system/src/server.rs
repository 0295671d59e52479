use std::sync::Arc;

use colored::Colorize;

use crate::{config::AccountingConfig, infrastructure::ServiceProvider};

pub async fn run(config: AccountingConfig) {
    let service_provider = match ServiceProvider::build(&config).await {
        Ok(x) => Arc::new(x),
        Err(e) => return eprintln!("{}: {e:#}", "Cannot build Service Provider".red()),
    };
    match service_provider.backend.ping(false).await {
        Ok(true) => tracing::info!("Accounting backend is reachable."),
        Ok(false) => tracing::warn!("Accounting backend doesn't answer, continuing anyway."),
        Err(e) => tracing::warn!("Accounting backend ping failed: {e}"),
    }

    let handles = service_provider
        .background_services()
        .into_iter()
        .map(|service| tokio::spawn(async move { service.run().await }))
        .collect::<Vec<_>>();
    tracing::info!("Accounting system started.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal: {e}");
    }
    tracing::info!("Stopping services (ctrl-c handling).");
    for handle in handles {
        handle.abort();
    }
}
