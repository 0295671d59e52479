use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "TelemetryConfig::default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub max_level: LoggingLevel,
    /// Extra directives, e.g. `service_accounting=debug`.
    #[serde(default)]
    pub level_filter: String,
    /// When set, directives are read from this environment variable instead.
    #[serde(default)]
    pub level_filter_env: String,
    #[serde(default)]
    pub enable_debug_logging: bool,
}

impl TelemetryConfig {
    pub fn default_enable() -> bool {
        true
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: Self::default_enable(),
            max_level: LoggingLevel::default(),
            level_filter: String::new(),
            level_filter_env: String::new(),
            enable_debug_logging: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(value: LoggingLevel) -> Self {
        match value {
            LoggingLevel::Off => LevelFilter::OFF,
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl From<LoggingLevel> for Directive {
    fn from(value: LoggingLevel) -> Self {
        LevelFilter::from(value).into()
    }
}

pub fn initialize_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !config.enable {
        return Ok(());
    }
    let builder = EnvFilter::builder().with_default_directive(config.max_level.into());
    let filter = if config.level_filter_env.is_empty() {
        builder.parse_lossy(&config.level_filter)
    } else {
        builder.with_env_var(&config.level_filter_env).from_env_lossy()
    };

    let debug = config.enable_debug_logging;
    let console = tracing_subscriber::fmt::layer()
        .with_file(debug)
        .with_line_number(debug)
        .with_thread_ids(debug)
        .with_target(debug)
        .with_filter(filter);

    Registry::default().with(console).try_init()?;
    Ok(())
}
