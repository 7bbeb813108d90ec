//! Realtime fan-out of committed state changes.
//!
//! The control loop is the only publisher. Each observer has its own
//! broadcast receiver, so a slow or vanished observer only loses its own
//! events and never holds up the loop. The latest full view is kept in a
//! watch channel: it answers synchronous status queries and resynchronizes
//! late or lagging observers.

use crate::apps::AppConfig;
use crate::state::CarouselConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, watch};

/// Immutable copy of the manager state handed to producers and observers
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    /// Incremented on every committed transition
    pub version: u64,
    pub active_app: Option<String>,
    /// Effective config of the active app (empty when idle)
    pub config: AppConfig,
    pub app_configs: BTreeMap<String, AppConfig>,
    pub carousel: CarouselConfig,
    pub brightness: u8,
    /// RFC 3339 time of the last committed transition
    pub updated_at: Option<String>,
}

/// Push event delivered to observers, tagged by category
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    FullState {
        state: StateView,
    },
    ActiveAppChanged {
        version: u64,
        app: Option<String>,
        config: AppConfig,
    },
    BrightnessChanged {
        version: u64,
        brightness: u8,
    },
    CarouselChanged {
        version: u64,
        carousel: CarouselConfig,
    },
    AppConfigChanged {
        version: u64,
        app: String,
        config: AppConfig,
    },
}

impl StateEvent {
    pub fn full(state: &StateView) -> Self {
        StateEvent::FullState {
            state: state.clone(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            StateEvent::FullState { .. } => "full_state",
            StateEvent::ActiveAppChanged { .. } => "active_app_changed",
            StateEvent::BrightnessChanged { .. } => "brightness_changed",
            StateEvent::CarouselChanged { .. } => "carousel_changed",
            StateEvent::AppConfigChanged { .. } => "app_config_changed",
        }
    }
}

/// Publisher side, owned by the control loop
pub struct Notifier {
    events: broadcast::Sender<StateEvent>,
    state: watch::Sender<StateView>,
}

impl Notifier {
    pub fn new(capacity: usize, initial: StateView) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (state, _) = watch::channel(initial);
        Self { events, state }
    }

    /// Cheap cloneable read side for producers and observers
    pub fn feed(&self) -> StateFeed {
        StateFeed {
            events: self.events.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Replace the current view and push the given events; never blocks
    pub fn publish(&self, view: StateView, events: Vec<StateEvent>) {
        self.state.send_replace(view);
        for event in events {
            tracing::debug!("Publishing {}", event.event_type());
            // No receivers is fine: nobody is watching right now
            let _ = self.events.send(event);
        }
    }

    /// Push a full-state event built from the current view
    pub fn publish_full_state(&self) {
        let event = StateEvent::full(&self.state.borrow());
        let _ = self.events.send(event);
    }
}

/// Read side of the notifier
#[derive(Clone)]
pub struct StateFeed {
    events: broadcast::Sender<StateEvent>,
    state: watch::Receiver<StateView>,
}

impl StateFeed {
    /// Copy of the latest committed view
    pub fn current(&self) -> StateView {
        self.state.borrow().clone()
    }

    /// The current view only if it changed after `version`
    pub fn changed_since(&self, version: u64) -> Option<StateView> {
        let state = self.state.borrow();
        (state.version > version).then(|| state.clone())
    }

    /// Wait until the view satisfies `f`
    pub async fn wait_for<F>(&self, mut f: F) -> StateView
    where
        F: FnMut(&StateView) -> bool,
    {
        let mut rx = self.state.clone();
        let result = rx.wait_for(|s| f(s)).await.map(|state| state.clone());
        // Publisher gone: report whatever was last committed
        result.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Register a new observer
    ///
    /// The first event returned by the observer is always a full-state event,
    /// so a late joiner never needs to poll.
    pub fn subscribe(&self) -> Observer {
        let events = self.events.subscribe();
        let initial = StateEvent::full(&self.state.borrow());
        Observer {
            pending: Some(initial),
            events,
            state: self.state.clone(),
        }
    }
}

/// One connected observer
pub struct Observer {
    pending: Option<StateEvent>,
    events: broadcast::Receiver<StateEvent>,
    state: watch::Receiver<StateView>,
}

impl Observer {
    /// Next event for this observer, or `None` once the publisher is gone
    pub async fn next(&mut self) -> Option<StateEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }

        match self.events.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!("Observer lagged by {} events, resynchronizing", missed);
                self.events = self.events.resubscribe();
                Some(StateEvent::full(&self.state.borrow()))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
