//! Durable manager state.
//!
//! The snapshot is the only on-disk contract: last running app, per-app
//! configuration, carousel setup and brightness. It is written after every
//! committed transition and read once at startup.

pub mod store;

pub use store::{write_atomic, StateStore, StoreError};

use crate::apps::{AppConfig, Registry};
use crate::display::MAX_BRIGHTNESS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One stop of the carousel rotation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarouselEntry {
    pub app: String,
    #[serde(alias = "duration")]
    pub duration_seconds: f64,
}

impl CarouselEntry {
    pub fn new(app: &str, duration_seconds: f64) -> Self {
        Self {
            app: app.to_string(),
            duration_seconds,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Carousel configuration as persisted and reported
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CarouselConfig {
    pub enabled: bool,
    pub entries: Vec<CarouselEntry>,
    pub current_index: usize,
}

/// Full durable state of the manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub last_running_app: Option<String>,
    pub app_configs: BTreeMap<String, AppConfig>,
    pub carousel: CarouselConfig,
    pub brightness: u8,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            last_running_app: None,
            app_configs: BTreeMap::new(),
            carousel: CarouselConfig::default(),
            brightness: MAX_BRIGHTNESS,
        }
    }
}

impl Snapshot {
    /// Drop everything that refers to applications no longer registered
    ///
    /// Unknown names are discarded rather than treated as errors, so a
    /// snapshot written by an older build still loads.
    pub fn sanitize(&mut self, registry: &Registry) {
        if let Some(name) = self.last_running_app.take() {
            if registry.contains(&name) {
                self.last_running_app = Some(name);
            } else {
                tracing::warn!("Last running app '{}' is no longer registered, ignoring", name);
            }
        }

        self.app_configs.retain(|name, _| {
            let known = registry.contains(name);
            if !known {
                tracing::warn!("Dropping saved config for unknown app '{}'", name);
            }
            known
        });

        let carousel = &mut self.carousel;
        let before = carousel.entries.len();
        carousel
            .entries
            .retain(|entry| registry.contains(&entry.app) && entry.duration_seconds > 0.0);
        if carousel.entries.len() != before {
            tracing::warn!(
                "Dropped {} invalid carousel entries",
                before - carousel.entries.len()
            );
        }

        if carousel.entries.is_empty() {
            carousel.current_index = 0;
            if carousel.enabled {
                tracing::warn!("Carousel has no usable entries, disabling");
                carousel.enabled = false;
            }
        } else {
            carousel.current_index %= carousel.entries.len();
        }

        self.brightness = self.brightness.min(MAX_BRIGHTNESS);
    }
}
