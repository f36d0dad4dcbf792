//! Logging setup for spacegate
//!
//! Events are emitted with `tracing` macros throughout the crate. Binaries call
//! [`init_logging_with_config`] once at startup; output goes to stderr so that
//! command output on stdout stays machine-readable.

use crate::config::LoggingConfig;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum level, overridden by `RUST_LOG` when set
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, with_timestamp: true, with_target: true, json_format: false }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Build from the `[logging]` section of the application config
    pub fn from_settings(settings: &LoggingConfig) -> Result<Self, LoggingError> {
        Ok(Self {
            level: settings.level.parse()?,
            with_timestamp: settings.with_timestamp,
            with_target: settings.with_target,
            json_format: settings.json_format,
        })
    }
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber
///
/// # Example
/// ```
/// use spacegate_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// let _ = init_logging_with_config(config);
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let base = fmt::layer().with_writer(std::io::stderr).with_target(config.with_target);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> =
        match (config.json_format, config.with_timestamp) {
            (true, true) => base.json().boxed(),
            (true, false) => base.json().without_time().boxed(),
            (false, true) => base.boxed(),
            (false, false) => base.without_time().boxed(),
        };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
