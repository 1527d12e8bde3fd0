//! Configuration management utilities

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "PROMPTCALL_";

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable present but not parseable
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// JSON configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Model used when a call does not name one
    pub default_model: Option<String>,
    /// Default maximum tokens to generate
    pub max_tokens: usize,
    /// Default sampling temperature
    pub temperature: Option<f32>,
    /// Retries after a failed first attempt (0 disables retrying)
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "promptcall".to_string(),
            environment: "development".to_string(),
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
            default_model: None,
            max_tokens: 1024,
            temperature: None,
            max_retries: 0,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a configuration from `PROMPTCALL_*` environment variables
    ///
    /// Recognised variables: `PROMPTCALL_APP_NAME`, `PROMPTCALL_ENVIRONMENT`,
    /// `PROMPTCALL_LOG`, `PROMPTCALL_LOG_FORMAT` (`pretty` | `json`),
    /// `PROMPTCALL_MODEL`, `PROMPTCALL_MAX_TOKENS`, `PROMPTCALL_TEMPERATURE`,
    /// `PROMPTCALL_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup("APP_NAME") {
            config.app_name = name;
        }
        if let Some(environment) = lookup("ENVIRONMENT") {
            config.environment = environment;
        }
        if let Some(filter) = lookup("LOG") {
            config.log_filter = filter;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", format)),
            };
        }
        if let Some(model) = lookup("MODEL") {
            config.default_model = Some(model);
        }
        if let Some(raw) = lookup("MAX_TOKENS") {
            config.max_tokens = raw.parse().map_err(|_| invalid("MAX_TOKENS", raw))?;
        }
        if let Some(raw) = lookup("TEMPERATURE") {
            let value: f32 = raw.parse().map_err(|_| invalid("TEMPERATURE", raw))?;
            config.temperature = Some(value);
        }
        if let Some(raw) = lookup("MAX_RETRIES") {
            config.max_retries = raw.parse().map_err(|_| invalid("MAX_RETRIES", raw))?;
        }

        Ok(config)
    }
}

fn invalid(key: &str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value,
    }
}
