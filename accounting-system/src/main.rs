mod background_service;
mod config;
mod infrastructure;
mod server;
mod telemetry;

use colored::Colorize;

#[tokio::main]
async fn main() {
    let config = match config::build_config() {
        Ok(x) => x,
        Err(e) => return eprintln!("{}: {e}", "Failed to build config".red()),
    };
    let accounting_config: config::AccountingConfig = match config.try_deserialize() {
        Ok(x) => x,
        Err(e) => return eprintln!("{}: {e}", "Invalid configuration".red()),
    };
    if let Err(e) = telemetry::initialize_telemetry(&accounting_config.telemetry) {
        return eprintln!("{}: {e:#}", "Failed to initialize telemetry".red());
    }

    server::run(accounting_config).await;
}
