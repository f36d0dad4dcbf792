//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file
    #[error("Configuration file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `SPACEGATE_*` variable whose value does not parse
    #[error("Invalid value for {var}: {message}")]
    EnvOverride { var: &'static str, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}
