//! Producer side of the command channel.
//!
//! Request handlers validate input here and enqueue intents. Nothing in this
//! file touches the device or a running application; state is read through
//! an immutable copy of the last committed view.

use super::intent::{CommandError, Intent};
use crate::apps::{AppConfig, Registry};
use crate::display::MAX_BRIGHTNESS;
use crate::notifier::{Observer, StateFeed, StateView};
use crate::state::{CarouselConfig, CarouselEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Cloneable handle given to every request handler
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<Intent>,
    registry: Arc<Registry>,
    feed: StateFeed,
    enqueue_timeout: Duration,
}

impl ManagerHandle {
    pub(super) fn new(
        tx: mpsc::Sender<Intent>,
        registry: Arc<Registry>,
        feed: StateFeed,
        enqueue_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            registry,
            feed,
            enqueue_timeout,
        }
    }

    /// Queue an intent, waiting briefly when the queue is full
    async fn enqueue(&self, intent: Intent) -> Result<(), CommandError> {
        use mpsc::error::SendTimeoutError;

        let kind = intent.kind();
        match self.tx.send_timeout(intent, self.enqueue_timeout).await {
            Ok(()) => {
                tracing::debug!("Queued {} intent", kind);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!("Command queue full, rejecting {} intent", kind);
                Err(CommandError::ChannelOverflow)
            }
            Err(SendTimeoutError::Closed(_)) => Err(CommandError::ManagerUnavailable),
        }
    }

    fn check_app(&self, name: &str) -> Result<(), CommandError> {
        if self.registry.contains(name) {
            Ok(())
        } else {
            Err(CommandError::UnknownApplication(name.to_string()))
        }
    }

    /// Queue a switch; returns once the intent is accepted
    pub async fn switch_app(
        &self,
        name: &str,
        config: Option<AppConfig>,
    ) -> Result<(), CommandError> {
        self.check_app(name)?;
        self.enqueue(Intent::SwitchApp {
            name: name.to_string(),
            config,
            reply: None,
        })
        .await
    }

    /// Queue a switch and wait until the control loop has committed it
    ///
    /// This is the only way to observe `SetupFailed` synchronously.
    pub async fn switch_app_and_wait(
        &self,
        name: &str,
        config: Option<AppConfig>,
    ) -> Result<(), CommandError> {
        self.check_app(name)?;
        let (reply, outcome) = oneshot::channel();
        self.enqueue(Intent::SwitchApp {
            name: name.to_string(),
            config,
            reply: Some(reply),
        })
        .await?;
        outcome.await.unwrap_or(Err(CommandError::ManagerUnavailable))
    }

    pub async fn stop(&self) -> Result<(), CommandError> {
        self.enqueue(Intent::Stop).await
    }

    /// Merge `patch` into the saved config of `name` (live if it is running)
    pub async fn update_config(&self, name: &str, patch: AppConfig) -> Result<(), CommandError> {
        self.check_app(name)?;
        self.enqueue(Intent::Reconfigure {
            name: name.to_string(),
            patch,
        })
        .await
    }

    /// Reconfigure whichever application is active right now
    pub async fn update_active_config(&self, patch: AppConfig) -> Result<String, CommandError> {
        let name = self
            .feed
            .current()
            .active_app
            .ok_or(CommandError::NoActiveApplication)?;
        self.update_config(&name, patch).await?;
        Ok(name)
    }

    pub async fn set_brightness(&self, value: i64) -> Result<(), CommandError> {
        let value = u8::try_from(value)
            .ok()
            .filter(|v| *v <= MAX_BRIGHTNESS)
            .ok_or(CommandError::OutOfRange(value))?;
        self.enqueue(Intent::SetBrightness { value }).await
    }

    /// Replace the carousel setup; rejected configs leave the carousel untouched
    pub async fn set_carousel(
        &self,
        enabled: bool,
        entries: Vec<CarouselEntry>,
    ) -> Result<(), CommandError> {
        validate_carousel(&self.registry, enabled, &entries)?;
        self.enqueue(Intent::SetCarousel {
            carousel: CarouselConfig {
                enabled,
                entries,
                current_index: 0,
            },
        })
        .await
    }

    /// Ask the control loop to push a full-state event to all observers
    pub async fn request_full_state(&self) -> Result<(), CommandError> {
        self.enqueue(Intent::RequestFullState).await
    }

    pub fn current_state(&self) -> StateView {
        self.feed.current()
    }

    pub fn state_since(&self, version: u64) -> Option<StateView> {
        self.feed.changed_since(version)
    }

    pub fn feed(&self) -> &StateFeed {
        &self.feed
    }

    pub fn subscribe(&self) -> Observer {
        self.feed.subscribe()
    }

    pub fn available_apps(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Whether the control loop is still consuming intents
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Check a carousel setup against the registry
pub fn validate_carousel(
    registry: &Registry,
    enabled: bool,
    entries: &[CarouselEntry],
) -> Result<(), CommandError> {
    if enabled && entries.is_empty() {
        return Err(CommandError::EmptyEntries);
    }

    for entry in entries {
        if !registry.contains(&entry.app) {
            return Err(CommandError::UnknownApplication(entry.app.clone()));
        }
        if !(entry.duration_seconds.is_finite() && entry.duration_seconds > 0.0) {
            return Err(CommandError::NonPositiveDuration {
                app: entry.app.clone(),
            });
        }
    }

    Ok(())
}
