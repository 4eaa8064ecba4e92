//! Daemon configuration for the Scout service-discovery engine.
//!
//! Loaded from a YAML file, optionally overridden by command-line flags in
//! the binary, and validated before the engine starts.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a newly exposed file-sourced configuration gets activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Enable immediately after exposing
    AutoEnable,
    /// Hold further file ingestion until an explicit enable/disable command
    WaitForCommand,
}

impl Default for ActivationMode {
    fn default() -> Self {
        ActivationMode::AutoEnable
    }
}

/// Main daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent name used in remote-protocol config ids
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Directories scanned for `*.conf` pipeline declarations
    #[serde(default)]
    pub conf_dirs: Vec<PathBuf>,

    /// Activation behavior for file-sourced configurations
    #[serde(default)]
    pub activation: ActivationMode,

    /// Conf-directory rescan interval, in seconds
    #[serde(default = "default_rescan_secs")]
    pub rescan_interval_secs: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (`trace`..`error`)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "scout".to_string()
}

fn default_rescan_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            conf_dirs: Vec::new(),
            activation: ActivationMode::default(),
            rescan_interval_secs: default_rescan_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::load_failed(path.display().to_string(), e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::parse_failed(e.to_string()))?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.agent_name.is_empty() {
            return Err(ConfigError::missing_field("agent_name").into());
        }
        if self.agent_name.contains(char::is_whitespace) || self.agent_name.contains(':') {
            return Err(ConfigError::invalid_value(
                "agent_name",
                "must not contain whitespace or ':'",
            )
            .into());
        }
        if self.rescan_interval_secs == 0 {
            return Err(
                ConfigError::invalid_value("rescan_interval_secs", "must be positive").into(),
            );
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::invalid_value(
                "logging.level",
                format!("unknown level '{other}'"),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.activation, ActivationMode::AutoEnable);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
agent_name: testagent
conf_dirs:
  - /etc/scout/sd.d
activation: wait_for_command
logging:
  level: debug
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.agent_name, "testagent");
        assert_eq!(config.conf_dirs.len(), 1);
        assert_eq!(config.activation, ActivationMode::WaitForCommand);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.agent_name = "has space".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rescan_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
