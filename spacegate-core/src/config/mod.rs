//! Configuration management for spacegate
//!
//! Defaults, TOML file loading, environment overrides and validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Directory store configuration
    pub store: StoreConfig,

    /// Tenant provisioning defaults
    pub provisioning: ProvisioningConfig,

    /// Per-request limits applied by callers
    pub request: RequestConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// SQLite directory store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,
}

/// Defaults applied when a tenant is provisioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Provision a personal tenant the first time a user lists spaces
    pub lazy_personal_tenants: bool,

    /// Prefix for generated personal tenant names
    pub personal_name_prefix: String,

    /// Billing plan for personal tenants
    pub personal_billing_plan: String,

    /// Billing plan for organization tenants
    pub organization_billing_plan: String,

    pub quotas: QuotaConfig,

    pub compliance: ComplianceConfig,

    /// Extra settings copied verbatim onto every tenant spec
    pub settings: BTreeMap<String, String>,
}

/// Tenant quota defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub max_storage_bytes: u64,
    pub max_documents: u64,
    pub max_api_calls_per_day: u64,
}

/// Tenant compliance defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub data_residency: String,
    pub retention_days: u32,
    pub encryption_at_rest: bool,
}

/// Request limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Deadline for a single resolve / list / mutation call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_path: PathBuf::from("./data/spacegate.db"), pool_size: 8 }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            lazy_personal_tenants: true,
            personal_name_prefix: "personal".to_string(),
            personal_billing_plan: "personal-free".to_string(),
            organization_billing_plan: "team".to_string(),
            quotas: QuotaConfig::default(),
            compliance: ComplianceConfig::default(),
            settings: BTreeMap::new(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_storage_bytes: 1024 * 1024 * 1024, // 1 GiB
            max_documents: 10_000,
            max_api_calls_per_day: 10_000,
        }
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self { data_residency: "us".to_string(), retention_days: 365, encryption_at_rest: true }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10) }
    }
}

fn parse_override<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&'static str) -> Option<String>,
{
    lookup(var)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::EnvOverride { var, message: e.to_string() })
        })
        .transpose()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: SPACEGATE_<SECTION>_<KEY>
    /// Example: SPACEGATE_STORE_DATABASE_PATH=/var/lib/spacegate.db
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay any SPACEGATE_* variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| env::var(var).ok())
    }

    /// Overlay SPACEGATE_* values returned by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        // Logging config
        if let Some(level) = lookup("SPACEGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_override(&lookup, "SPACEGATE_LOG_JSON")? {
            self.logging.json_format = json;
        }

        // Store config
        if let Some(path) = lookup("SPACEGATE_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Some(size) = parse_override(&lookup, "SPACEGATE_STORE_POOL_SIZE")? {
            self.store.pool_size = size;
        }

        // Provisioning config
        if let Some(lazy) = parse_override(&lookup, "SPACEGATE_PROVISIONING_LAZY_PERSONAL_TENANTS")? {
            self.provisioning.lazy_personal_tenants = lazy;
        }
        if let Some(plan) = lookup("SPACEGATE_PROVISIONING_PERSONAL_BILLING_PLAN") {
            self.provisioning.personal_billing_plan = plan;
        }
        if let Some(residency) = lookup("SPACEGATE_PROVISIONING_DATA_RESIDENCY") {
            self.provisioning.compliance.data_residency = residency;
        }

        // Request config
        let timeout_var = "SPACEGATE_REQUEST_TIMEOUT";
        if let Some(timeout) = lookup(timeout_var) {
            self.request.timeout = humantime_serde::re::humantime::parse_duration(timeout.trim())
                .map_err(|e| ConfigError::EnvOverride { var: timeout_var, message: e.to_string() })?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.provisioning.personal_billing_plan.trim().is_empty()
            || self.provisioning.organization_billing_plan.trim().is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "billing plans must not be empty".to_string(),
            ));
        }

        if self.provisioning.quotas.max_storage_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_storage_bytes must be greater than 0".to_string(),
            ));
        }

        if self.request.timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }
}
