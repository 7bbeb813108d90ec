//! Matrix applications and the registry they are started from.
//!
//! An application is constructed with its effective configuration, set up
//! once, asked for one frame at a time, reconfigured in place, and torn down
//! before the next one is created. The control loop is the only caller.

pub mod clock;
pub mod solid;
pub mod stars;

use crate::display::{Device, DisplayError};
use image::Rgb;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;

/// Per-application configuration object
pub type AppConfig = Map<String, Value>;

/// Frame cadence used when an application does not pick its own
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Application faults
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid config value for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Application panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Lifecycle contract every matrix application implements
pub trait Application: Send {
    /// Called once before the first frame
    fn setup(&mut self, device: &mut dyn Device) -> Result<(), AppError>;

    /// Draw exactly one frame
    fn render_frame(&mut self, device: &mut dyn Device) -> Result<(), AppError>;

    /// Apply a merged configuration while running
    fn update_config(&mut self, _config: &AppConfig) -> Result<(), AppError> {
        Ok(())
    }

    /// Release resources; the default blanks the display
    fn teardown(&mut self, device: &mut dyn Device) {
        device.clear();
    }

    /// Delay between two frames
    fn frame_interval(&self) -> Duration {
        DEFAULT_FRAME_INTERVAL
    }
}

/// Constructor for an application instance
pub type AppFactory = Box<dyn Fn(&AppConfig) -> Box<dyn Application> + Send + Sync>;

/// Registered application names and their factories
#[derive(Default)]
pub struct Registry {
    apps: BTreeMap<String, AppFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in applications
    pub fn with_builtin_apps() -> Self {
        let mut registry = Self::new();
        registry.register("clock", |config| Box::new(clock::ClockApp::new(config)));
        registry.register("solid", |config| Box::new(solid::SolidApp::new(config)));
        registry.register("stars", |config| Box::new(stars::StarsApp::new(config)));
        registry
    }

    /// Register an application; a later registration under the same name wins
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AppConfig) -> Box<dyn Application> + Send + Sync + 'static,
    {
        if self.apps.insert(name.to_string(), Box::new(factory)).is_some() {
            tracing::warn!("Application '{}' registered twice, keeping the last one", name);
        } else {
            tracing::info!("Registered app: {}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.apps.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Construct an instance, catching a panicking factory
    pub fn instantiate(
        &self,
        name: &str,
        config: &AppConfig,
    ) -> Option<Result<Box<dyn Application>, AppError>> {
        let factory = self.apps.get(name)?;
        Some(guard(|| Ok(factory(config))))
    }
}

/// Run application code, turning a panic into an [`AppError`]
pub fn guard<T>(f: impl FnOnce() -> Result<T, AppError>) -> Result<T, AppError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(AppError::Panicked(message))
        }
    }
}

/// Shallow merge: top-level keys of `patch` replace those in `base`
pub fn merge_config(base: &mut AppConfig, patch: &AppConfig) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// Read an `[r, g, b]` color from the config
pub fn config_color(config: &AppConfig, key: &str, default: Rgb<u8>) -> Result<Rgb<u8>, AppError> {
    let Some(value) = config.get(key) else {
        return Ok(default);
    };

    let invalid = || AppError::InvalidConfig {
        key: key.to_string(),
        reason: format!("expected [r, g, b] with 0-255 components, got {}", value),
    };

    let parts = value.as_array().ok_or_else(invalid)?;
    if parts.len() != 3 {
        return Err(invalid());
    }

    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(parts) {
        *slot = part
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(invalid)?;
    }
    Ok(Rgb(rgb))
}

/// Read a positive number from the config
pub fn config_number(config: &AppConfig, key: &str, default: f64) -> Result<f64, AppError> {
    match config.get(key) {
        None => Ok(default),
        Some(value) => value
            .as_f64()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| AppError::InvalidConfig {
                key: key.to_string(),
                reason: format!("expected a positive number, got {}", value),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> AppConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_replaces_top_level_keys_only() {
        let mut base = config(json!({"color": [1, 2, 3], "speed": 1}));
        merge_config(&mut base, &config(json!({"speed": 5, "text": "hi"})));

        assert_eq!(
            Value::Object(base),
            json!({"color": [1, 2, 3], "speed": 5, "text": "hi"})
        );
    }

    #[test]
    fn color_parsing() {
        let cfg = config(json!({"color": [255, 0, 10], "bad": [300, 0, 0], "short": [1, 2]}));
        let white = Rgb([255, 255, 255]);

        assert_eq!(config_color(&cfg, "color", white).unwrap(), Rgb([255, 0, 10]));
        assert_eq!(config_color(&cfg, "missing", white).unwrap(), white);
        assert!(config_color(&cfg, "bad", white).is_err());
        assert!(config_color(&cfg, "short", white).is_err());
    }

    #[test]
    fn number_must_be_positive() {
        let cfg = config(json!({"fps": 30, "zero": 0, "text": "x"}));
        assert_eq!(config_number(&cfg, "fps", 1.0).unwrap(), 30.0);
        assert_eq!(config_number(&cfg, "missing", 2.5).unwrap(), 2.5);
        assert!(config_number(&cfg, "zero", 1.0).is_err());
        assert!(config_number(&cfg, "text", 1.0).is_err());
    }

    #[test]
    fn guard_catches_panics() {
        let result: Result<(), AppError> = guard(|| panic!("boom"));
        assert!(matches!(result, Err(AppError::Panicked(msg)) if msg == "boom"));
    }

    #[test]
    fn builtin_registry() {
        let registry = Registry::with_builtin_apps();
        assert_eq!(registry.names(), vec!["clock", "solid", "stars"]);
        assert!(registry.instantiate("missing", &AppConfig::new()).is_none());
        assert!(registry.instantiate("clock", &AppConfig::new()).unwrap().is_ok());
    }
}
