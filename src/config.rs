//! Configuration management for the matrix server.
//!
//! Handles loading, saving, and validating configuration from JSON files.

use crate::manager::ManagerSettings;
use crate::state::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address the web server binds to
    pub bind_address: String,

    /// Web server port
    pub web_port: u16,

    /// Where the manager snapshot is persisted
    pub state_path: PathBuf,

    /// Matrix size in pixels
    pub matrix_width: u32,
    pub matrix_height: u32,

    /// App started when there is nothing to resume
    pub initial_app: Option<String>,

    /// Intents applied between two frames
    pub max_intents_per_iteration: usize,

    pub command_queue_capacity: usize,

    /// How long a request waits on a full command queue
    pub enqueue_timeout_ms: u64,

    /// Control loop period while idle
    pub idle_tick_ms: u64,

    /// Buffered events per observer before it is resynchronised
    pub event_capacity: usize,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let manager = ManagerSettings::default();
        Self {
            bind_address: "0.0.0.0".to_string(),
            web_port: 5000,
            state_path: PathBuf::from("state.json"),
            matrix_width: crate::display::simulated::DEFAULT_WIDTH,
            matrix_height: crate::display::simulated::DEFAULT_HEIGHT,
            initial_app: None,
            max_intents_per_iteration: manager.max_intents_per_iteration,
            command_queue_capacity: manager.command_queue_capacity,
            enqueue_timeout_ms: manager.enqueue_timeout.as_millis() as u64,
            idle_tick_ms: manager.idle_tick.as_millis() as u64,
            event_capacity: manager.event_capacity,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path.as_ref(), &content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web_port == 0 {
            return Err(ConfigError::ValidationError(
                "web_port must be greater than 0".to_string(),
            ));
        }

        if self.matrix_width == 0 || self.matrix_height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "matrix size {}x{} must be non-zero",
                self.matrix_width, self.matrix_height
            )));
        }

        for (name, value) in [
            ("max_intents_per_iteration", self.max_intents_per_iteration),
            ("command_queue_capacity", self.command_queue_capacity),
            ("event_capacity", self.event_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.state_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "state_path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Control loop tunables derived from this config
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_intents_per_iteration: self.max_intents_per_iteration,
            command_queue_capacity: self.command_queue_capacity,
            enqueue_timeout: Duration::from_millis(self.enqueue_timeout_ms),
            idle_tick: Duration::from_millis(self.idle_tick_ms),
            event_capacity: self.event_capacity,
            initial_app: self.initial_app.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"web_port": 8080}"#).unwrap();
        assert_eq!(config.web_port, 8080);
        assert_eq!(config.state_path, PathBuf::from("state.json"));
        assert_eq!((config.matrix_width, config.matrix_height), (64, 32));
        assert_eq!(config.max_intents_per_iteration, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_values() {
        let config = Config {
            web_port: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let config = Config {
            command_queue_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            matrix_height: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            initial_app: Some("clock".to_string()),
            enqueue_timeout_ms: 50,
            ..Config::default()
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"event_capacity": 0}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::ValidationError(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn manager_settings_follow_config() {
        let config = Config {
            idle_tick_ms: 20,
            initial_app: Some("stars".to_string()),
            ..Config::default()
        };
        let settings = config.manager_settings();
        assert_eq!(settings.idle_tick, Duration::from_millis(20));
        assert_eq!(settings.initial_app.as_deref(), Some("stars"));
    }
}
