//! Timed rotation through a configured sequence of applications.
//!
//! Evaluated once per loop iteration. Time is passed in rather than read, so
//! the rotation is a pure function of the clock the loop hands it.

use crate::state::CarouselConfig;
use tokio::time::Instant;

pub struct Carousel {
    config: CarouselConfig,
    last_transition: Instant,
}

impl Carousel {
    pub fn new(config: CarouselConfig, now: Instant) -> Self {
        Self {
            config,
            last_transition: now,
        }
    }

    pub fn config(&self) -> &CarouselConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.entries.is_empty()
    }

    /// App of the entry the rotation currently sits on
    pub fn current_app(&self) -> Option<&str> {
        self.config
            .entries
            .get(self.config.current_index)
            .map(|entry| entry.app.as_str())
    }

    /// Restart the timer, e.g. after a manual switch
    pub fn reset_timer(&mut self, now: Instant) {
        self.last_transition = now;
    }

    /// Install a new configuration
    ///
    /// Returns true when the rotation should (re)start on its current entry:
    /// it was just enabled, or its entries changed while enabled. Identical
    /// entries keep their position so a disabled rotation can resume.
    pub fn replace(&mut self, mut config: CarouselConfig, now: Instant) -> bool {
        let same_entries = config.entries == self.config.entries;
        config.current_index = if same_entries && !config.entries.is_empty() {
            self.config.current_index % config.entries.len()
        } else {
            0
        };

        let restart = config.enabled && (!self.config.enabled || !same_entries);
        self.config = config;
        if restart {
            self.last_transition = now;
        }
        restart
    }

    /// Advance when the current entry's time is up
    ///
    /// Returns the app to switch to.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        let len = self.config.entries.len();
        let index = self.config.current_index % len;
        let duration = self.config.entries[index].duration();
        if now.saturating_duration_since(self.last_transition) < duration {
            return None;
        }

        let next = (index + 1) % len;
        self.config.current_index = next;
        self.last_transition = now;
        Some(self.config.entries[next].app.clone())
    }
}
