//! Generator configuration.
//!
//! Flow settings for an [`ItemGenerator`](super::ItemGenerator): batch size,
//! concurrency of the strategy and scoring stages, and an optional
//! statistics-driven after-filter policy. Values come from code (builder
//! methods), environment variables or a YAML file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::AfterFilterPolicy;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flow configuration for a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of items scored per scorer call.
    pub batch_size: usize,
    /// Run every strategy's generation at once instead of one after another.
    pub concurrent_strategies: bool,
    /// Maximum number of batches being scored at the same time.
    pub scoring_concurrency: usize,
    /// Statistics-driven policy used when no after-filter factory is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_filter: Option<AfterFilterPolicy>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrent_strategies: false,
            scoring_concurrency: 1,
            after_filter: None,
        }
    }
}

impl GeneratorConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ITEMFORGE_BATCH_SIZE`: Items per scorer call (default: 64)
    /// - `ITEMFORGE_CONCURRENT_STRATEGIES`: Run strategies concurrently (default: false)
    /// - `ITEMFORGE_SCORING_CONCURRENCY`: Batches scored at once (default: 1)
    /// - `ITEMFORGE_AFTER_FILTER`: After-filter policy, e.g. `top_k=100` or `above_mean`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ITEMFORGE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "ITEMFORGE_BATCH_SIZE")?;
        }

        if let Ok(val) = std::env::var("ITEMFORGE_CONCURRENT_STRATEGIES") {
            config.concurrent_strategies = parse_env_bool(&val, "ITEMFORGE_CONCURRENT_STRATEGIES")?;
        }

        if let Ok(val) = std::env::var("ITEMFORGE_SCORING_CONCURRENCY") {
            config.scoring_concurrency = parse_env_value(&val, "ITEMFORGE_SCORING_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("ITEMFORGE_AFTER_FILTER") {
            let policy = val.parse::<AfterFilterPolicy>().map_err(|message| ConfigError::InvalidValue {
                key: "ITEMFORGE_AFTER_FILTER".to_string(),
                message,
            })?;
            config.after_filter = Some(policy);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses configuration from YAML. Missing keys take their default.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.scoring_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "scoring_concurrency must be greater than 0".to_string(),
            ));
        }

        if let Some(policy) = &self.after_filter {
            policy.validate().map_err(ConfigError::ValidationFailed)?;
        }

        Ok(())
    }

    /// Builder method to set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Builder method to enable or disable concurrent strategy generation.
    pub fn with_concurrent_strategies(mut self, enabled: bool) -> Self {
        self.concurrent_strategies = enabled;
        self
    }

    /// Builder method to set how many batches may be scored at once.
    pub fn with_scoring_concurrency(mut self, concurrency: usize) -> Self {
        self.scoring_concurrency = concurrency;
        self
    }

    /// Builder method to set the after-filter policy.
    pub fn with_after_filter(mut self, policy: AfterFilterPolicy) -> Self {
        self.after_filter = Some(policy);
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
