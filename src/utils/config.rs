//! Application configuration
//!
//! Defaults, optionally overlaid by a YAML file, then by environment
//! variables. CLI flags are applied last by the caller.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::driver::SessionOptions;
use crate::runner::{FlowConfig, RunMode};

pub const ENV_HEADLESS: &str = "STOREFRONT_HEADLESS";
pub const ENV_DATABASE_URL: &str = "STOREFRONT_DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storefront start page
    pub url: Option<String>,
    pub mode: RunMode,
    /// Pause between monitor Runs
    pub interval_hours: f64,
    pub headless: bool,
    /// `sqlite:` or `mysql:` URL of the step log
    pub database_url: Option<String>,
    pub port: u16,
    pub flow: FlowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            mode: RunMode::Fast,
            interval_hours: 1.0,
            headless: true,
            database_url: None,
            port: 5000,
            flow: FlowConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (defaults when `None`) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(text)?;
        config.flow = config.flow.normalized();
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_HEADLESS) {
            self.headless = parse_bool(&value).ok_or_else(|| {
                ConfigError::Invalid(format!("{} must be a boolean, got '{}'", ENV_HEADLESS, value))
            })?;
        }
        if let Some(value) = lookup(ENV_DATABASE_URL) {
            let value = value.trim();
            self.database_url = (!value.is_empty()).then(|| value.to_string());
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.interval_hours.is_finite() && self.interval_hours > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "interval_hours must be positive, got {}",
                self.interval_hours
            )));
        }
        if self.flow.target_items == 0 {
            return Err(ConfigError::Invalid("flow.target_items must be at least 1".into()));
        }
        if self.flow.max_iteration_failures == 0 {
            return Err(ConfigError::Invalid(
                "flow.max_iteration_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            headless: self.headless,
            ..SessionOptions::default()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
