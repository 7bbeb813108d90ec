//! Application lifecycle manager.
//!
//! Owns the device and the running application. All mutating commands arrive
//! as intents on a bounded channel and are applied here, between frames, by a
//! single consumer. Every committed transition is persisted and published
//! before the loop resumes.

pub mod carousel;
pub mod handle;
pub mod intent;

#[cfg(test)]
mod tests;

pub use carousel::Carousel;
pub use handle::{validate_carousel, ManagerHandle};
pub use intent::{CommandError, Intent};

use crate::apps::{self, merge_config, AppConfig, AppError, Application, Registry};
use crate::display::{Device, MAX_BRIGHTNESS};
use crate::notifier::{Notifier, StateEvent, StateView};
use crate::state::{CarouselConfig, Snapshot, StateStore};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// Tunables for the control loop
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Intents applied per iteration before the next frame is drawn
    pub max_intents_per_iteration: usize,
    pub command_queue_capacity: usize,
    /// How long a producer waits on a full queue before being rejected
    pub enqueue_timeout: Duration,
    /// Loop period while no application is running
    pub idle_tick: Duration,
    pub event_capacity: usize,
    /// Started when the snapshot names nothing to resume
    pub initial_app: Option<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_intents_per_iteration: 8,
            command_queue_capacity: 64,
            enqueue_timeout: Duration::from_millis(250),
            idle_tick: Duration::from_millis(100),
            event_capacity: 64,
            initial_app: None,
        }
    }
}

/// Categories of committed change
#[derive(Debug, Clone, PartialEq)]
enum Change {
    ActiveApp,
    Brightness,
    Carousel,
    AppConfig(String),
}

struct RunningApplication {
    name: String,
    instance: Box<dyn Application>,
    config: AppConfig,
    /// Read once through the panic guard, never inside the select
    frame_interval: Duration,
}

impl RunningApplication {
    fn refresh_frame_interval(&mut self) {
        let instance = &self.instance;
        self.frame_interval = apps::guard(|| Ok(instance.frame_interval())).unwrap_or_else(|e| {
            tracing::warn!("App {} has no usable frame interval: {}", self.name, e);
            apps::DEFAULT_FRAME_INTERVAL
        });
    }
}

/// The single owner of the device
pub struct Manager {
    device: Box<dyn Device>,
    registry: Arc<Registry>,
    store: StateStore,
    notifier: Notifier,
    rx: mpsc::Receiver<Intent>,
    pending: VecDeque<Intent>,
    settings: ManagerSettings,

    running: Option<RunningApplication>,
    app_configs: BTreeMap<String, AppConfig>,
    last_running_app: Option<String>,
    carousel: Carousel,
    brightness: u8,

    version: u64,
    updated_at: Option<String>,
    changes: Vec<Change>,
}

impl Manager {
    /// Build the manager from the persisted snapshot
    ///
    /// Nothing touches the device until [`Manager::run`] (or
    /// [`Manager::resume`]) is called on the control thread.
    pub fn new(
        device: Box<dyn Device>,
        registry: Arc<Registry>,
        store: StateStore,
        settings: ManagerSettings,
    ) -> (Self, ManagerHandle) {
        let mut snapshot = store.load();
        snapshot.sanitize(&registry);

        let (tx, rx) = mpsc::channel(settings.command_queue_capacity.max(1));
        let notifier = Notifier::new(settings.event_capacity, StateView::default());
        let handle = ManagerHandle::new(
            tx,
            Arc::clone(&registry),
            notifier.feed(),
            settings.enqueue_timeout,
        );

        let manager = Self {
            device,
            registry,
            store,
            notifier,
            rx,
            pending: VecDeque::new(),
            settings,
            running: None,
            app_configs: snapshot.app_configs,
            last_running_app: snapshot.last_running_app,
            carousel: Carousel::new(snapshot.carousel, Instant::now()),
            brightness: snapshot.brightness,
            version: 0,
            updated_at: None,
            changes: Vec::new(),
        };
        manager.notifier.publish(manager.view(), Vec::new());

        (manager, handle)
    }

    /// Run the control loop until shutdown
    ///
    /// Each iteration drains a bounded number of intents, draws one frame of
    /// the active application, then lets the carousel rotate. A hung
    /// application stalls this loop; there is no per-frame timeout.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Application manager started");
        self.resume(Instant::now());

        loop {
            self.step(Instant::now());

            let idle = self.running.is_none();
            let wait = self
                .running
                .as_ref()
                .map(|running| running.frame_interval)
                .unwrap_or(self.settings.idle_tick);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                intent = self.rx.recv(), if idle => match intent {
                    Some(intent) => self.pending.push_back(intent),
                    None => {
                        tracing::info!("All command producers are gone");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Application manager shutting down");
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Restore the persisted session
    ///
    /// An enabled carousel wins over the last running app, which wins over
    /// the configured initial app.
    pub fn resume(&mut self, now: Instant) {
        self.device.set_brightness(self.brightness);

        let target = if self.carousel.is_enabled() {
            self.carousel.current_app().map(str::to_string)
        } else if let Some(last) = self.last_running_app.clone() {
            Some(last)
        } else {
            self.settings
                .initial_app
                .clone()
                .filter(|name| self.registry.contains(name))
        };

        self.carousel.reset_timer(now);
        if let Some(app) = target {
            tracing::info!("Resuming app: {}", app);
            // Failures are logged inside; the manager just stays idle
            let _ = self.switch_to(&app, None);
        }
        self.flush();
    }

    /// One loop iteration: intents, one frame, carousel
    pub fn step(&mut self, now: Instant) {
        let preempted = self.drain_intents(now);
        self.render_frame();

        // External commands always win over a pending rotation
        if !preempted && self.pending.is_empty() && self.rx.is_empty() {
            self.tick_carousel(now);
        }
    }

    fn drain_intents(&mut self, now: Instant) -> bool {
        let mut preempted = false;
        for _ in 0..self.settings.max_intents_per_iteration.max(1) {
            let intent = match self.pending.pop_front() {
                Some(intent) => intent,
                None => match self.rx.try_recv() {
                    Ok(intent) => intent,
                    Err(_) => break,
                },
            };
            preempted |= intent.preempts_carousel();
            self.apply(intent, now);
        }
        preempted
    }

    fn apply(&mut self, intent: Intent, now: Instant) {
        tracing::debug!("Applying {} intent", intent.kind());

        match intent {
            Intent::SwitchApp {
                name,
                config,
                reply,
            } => {
                let result = self.switch_to(&name, config);
                self.carousel.reset_timer(now);
                self.flush();
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Intent::Stop => {
                if self.stop_active().is_some() {
                    self.mark(Change::ActiveApp);
                }
                // An explicit stop means nothing should auto-resume
                if self.last_running_app.take().is_some() {
                    self.mark(Change::ActiveApp);
                }
                self.carousel.reset_timer(now);
            }
            Intent::Reconfigure { name, patch } => self.reconfigure(&name, &patch),
            Intent::SetBrightness { value } => self.set_brightness(value),
            Intent::SetCarousel { carousel } => self.set_carousel(carousel, now),
            Intent::RequestFullState => self.notifier.publish_full_state(),
        }

        self.flush();
    }

    /// Tear down the active app and blank the display
    ///
    /// Returns the name and config of what was running.
    fn stop_active(&mut self) -> Option<(String, AppConfig)> {
        let mut running = self.running.take()?;
        tracing::info!("Stopping app: {}", running.name);

        let device = &mut self.device;
        let result = apps::guard(|| {
            running.instance.teardown(device.as_mut());
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!("Error stopping app {}: {}", running.name, e);
        }
        self.device.clear();

        Some((running.name, running.config))
    }

    /// Instantiate and set up an app; only sets `running` on success
    fn start(&mut self, name: &str, config: AppConfig) -> Result<(), AppError> {
        let mut instance = self
            .registry
            .instantiate(name, &config)
            .ok_or_else(|| AppError::Other(format!("app '{}' is not registered", name)))??;

        let device = &mut self.device;
        apps::guard(|| instance.setup(device.as_mut()))?;

        tracing::info!("Started app: {}", name);
        let mut running = RunningApplication {
            name: name.to_string(),
            instance,
            config,
            frame_interval: apps::DEFAULT_FRAME_INTERVAL,
        };
        running.refresh_frame_interval();
        self.running = Some(running);
        Ok(())
    }

    fn switch_to(&mut self, name: &str, requested: Option<AppConfig>) -> Result<(), CommandError> {
        if !self.registry.contains(name) {
            tracing::error!("App not found: {}", name);
            return Err(CommandError::UnknownApplication(name.to_string()));
        }

        let mut effective = self.app_configs.get(name).cloned().unwrap_or_default();
        if let Some(patch) = &requested {
            merge_config(&mut effective, patch);
        }

        // The old instance is always gone before the new one is set up
        let previous = self.stop_active();

        match self.start(name, effective.clone()) {
            Ok(()) => {
                self.app_configs.insert(name.to_string(), effective);
                self.last_running_app = Some(name.to_string());
                self.mark(Change::ActiveApp);
                if requested.is_some() {
                    self.mark(Change::AppConfig(name.to_string()));
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start app {}: {}", name, e);
                self.device.clear();

                // A successful restore leaves the committed view as it was
                if let Some((previous_name, previous_config)) = previous {
                    match self.start(&previous_name, previous_config) {
                        Ok(()) => tracing::info!("Restored previous app: {}", previous_name),
                        Err(restore) => {
                            tracing::error!(
                                "Failed to restore app {}: {}",
                                previous_name,
                                restore
                            );
                            self.device.clear();
                            self.mark(Change::ActiveApp);
                        }
                    }
                }
                if self.running.is_none() && self.last_running_app.take().is_some() {
                    self.mark(Change::ActiveApp);
                }

                Err(CommandError::SetupFailed {
                    app: name.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn reconfigure(&mut self, name: &str, patch: &AppConfig) {
        if !self.registry.contains(name) {
            tracing::warn!("Ignoring config for unknown app: {}", name);
            return;
        }

        let live = self.running.as_mut().filter(|running| running.name == name);
        let mut merged = match &live {
            Some(running) => running.config.clone(),
            None => self.app_configs.get(name).cloned().unwrap_or_default(),
        };
        merge_config(&mut merged, patch);

        // Applied in place: no teardown/setup cycle, no flicker
        if let Some(running) = live {
            let instance = &mut running.instance;
            if let Err(e) = apps::guard(|| instance.update_config(&merged)) {
                tracing::warn!("App {} rejected config update: {}", name, e);
                return;
            }
            running.config = merged.clone();
            running.refresh_frame_interval();
            self.mark(Change::ActiveApp);
        }

        tracing::info!("Updated config for {}", name);
        self.app_configs.insert(name.to_string(), merged);
        self.mark(Change::AppConfig(name.to_string()));
    }

    fn set_brightness(&mut self, value: u8) {
        let value = value.min(MAX_BRIGHTNESS);
        // Unchanged value: no save, no notification
        if value == self.brightness {
            tracing::debug!("Brightness already {}", value);
            return;
        }

        self.device.set_brightness(value);
        self.brightness = value;
        tracing::info!("Brightness set to {}", value);
        self.mark(Change::Brightness);
    }

    fn set_carousel(&mut self, carousel: CarouselConfig, now: Instant) {
        if let Err(e) = validate_carousel(&self.registry, carousel.enabled, &carousel.entries) {
            tracing::warn!("Ignoring carousel update: {}", e);
            return;
        }

        let before = self.carousel.config().clone();
        let restart = self.carousel.replace(carousel, now);
        if *self.carousel.config() != before {
            self.mark(Change::Carousel);
        }

        if restart {
            if let Some(app) = self.carousel.current_app().map(str::to_string) {
                let already_running = self
                    .running
                    .as_ref()
                    .is_some_and(|running| running.name == app);
                // The timer was restarted by replace; no teardown needed
                if already_running {
                    tracing::info!("Carousel starting with {}, already running", app);
                } else {
                    tracing::info!("Carousel starting with {}", app);
                    let _ = self.switch_to(&app, None);
                }
            }
        }
    }

    fn tick_carousel(&mut self, now: Instant) {
        let Some(app) = self.carousel.tick(now) else {
            return;
        };

        tracing::info!("Carousel rotating to {}", app);
        self.mark(Change::Carousel);
        // A failing entry is skipped at the next tick
        let _ = self.switch_to(&app, None);
        self.flush();
    }

    fn render_frame(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        let device = &mut self.device;
        let result = apps::guard(|| running.instance.render_frame(device.as_mut()));
        if let Err(e) = result {
            tracing::error!("App {} crashed, stopping it: {}", running.name, e);
            // A render fault is an implicit stop
            self.stop_active();
            self.last_running_app = None;
            self.mark(Change::ActiveApp);
            self.flush();
        }
    }

    fn shutdown(&mut self) {
        // last_running_app is kept so the next start resumes it
        if self.stop_active().is_some() {
            self.mark(Change::ActiveApp);
        }
        self.flush();
        tracing::info!("Application manager stopped");
    }

    fn mark(&mut self, change: Change) {
        if !self.changes.contains(&change) {
            self.changes.push(change);
        }
    }

    /// Commit pending changes: persist, then notify
    fn flush(&mut self) {
        if self.changes.is_empty() {
            return;
        }
        let changes = std::mem::take(&mut self.changes);

        self.version += 1;
        self.updated_at = Some(chrono::Local::now().to_rfc3339());

        // In-memory state stays authoritative; the next commit retries
        if let Err(e) = self.store.save(&self.snapshot()) {
            tracing::error!("Failed to persist state: {}", e);
        }

        let view = self.view();
        let events = changes
            .into_iter()
            .map(|change| self.event_for(change, &view))
            .collect();
        self.notifier.publish(view, events);
    }

    fn event_for(&self, change: Change, view: &StateView) -> StateEvent {
        let version = view.version;
        match change {
            Change::ActiveApp => StateEvent::ActiveAppChanged {
                version,
                app: view.active_app.clone(),
                config: view.config.clone(),
            },
            Change::Brightness => StateEvent::BrightnessChanged {
                version,
                brightness: view.brightness,
            },
            Change::Carousel => StateEvent::CarouselChanged {
                version,
                carousel: view.carousel.clone(),
            },
            Change::AppConfig(app) => StateEvent::AppConfigChanged {
                version,
                config: self.app_configs.get(&app).cloned().unwrap_or_default(),
                app,
            },
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            last_running_app: self.last_running_app.clone(),
            app_configs: self.app_configs.clone(),
            carousel: self.carousel.config().clone(),
            brightness: self.brightness,
        }
    }

    fn view(&self) -> StateView {
        StateView {
            version: self.version,
            active_app: self.running.as_ref().map(|running| running.name.clone()),
            config: self
                .running
                .as_ref()
                .map(|running| running.config.clone())
                .unwrap_or_default(),
            app_configs: self.app_configs.clone(),
            carousel: self.carousel.config().clone(),
            brightness: self.brightness,
            updated_at: self.updated_at.clone(),
        }
    }
}
