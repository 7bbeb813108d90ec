use super::*;
use crate::display::{SimulatedMatrix, ThreadBoundDevice};
use crate::state::CarouselEntry;
use serde_json::{json, Value};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum Behavior {
    Normal,
    FailSetup,
    FailRender,
    PanicRender,
    PanicInterval,
}

/// Shared log of lifecycle calls made on mock apps
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    /// Lifecycle calls so far, without per-frame renders
    fn lifecycle(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.ends_with(":render"))
            .cloned()
            .collect()
    }

    fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

struct MockApp {
    name: String,
    behavior: Behavior,
    journal: Journal,
}

impl Application for MockApp {
    fn setup(&mut self, _device: &mut dyn Device) -> Result<(), AppError> {
        self.journal.push(format!("{}:setup", self.name));
        match self.behavior {
            Behavior::FailSetup => Err(AppError::Other("no font".to_string())),
            _ => Ok(()),
        }
    }

    fn render_frame(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        self.journal.push(format!("{}:render", self.name));
        match self.behavior {
            Behavior::FailRender => Err(AppError::Other("frame failed".to_string())),
            Behavior::PanicRender => panic!("frame exploded"),
            _ => {
                let canvas = device.create_canvas();
                device.present(&canvas)?;
                Ok(())
            }
        }
    }

    fn update_config(&mut self, config: &AppConfig) -> Result<(), AppError> {
        if config.get("reject").is_some() {
            return Err(AppError::InvalidConfig {
                key: "reject".to_string(),
                reason: "test".to_string(),
            });
        }
        self.journal.push(format!("{}:update", self.name));
        Ok(())
    }

    fn teardown(&mut self, device: &mut dyn Device) {
        self.journal.push(format!("{}:teardown", self.name));
        device.clear();
    }

    fn frame_interval(&self) -> Duration {
        match self.behavior {
            Behavior::PanicInterval => panic!("interval overflow"),
            _ => Duration::from_millis(20),
        }
    }
}

fn registry(journal: &Journal) -> Registry {
    let mut registry = Registry::new();
    for (name, behavior) in [
        ("clock", Behavior::Normal),
        ("scroll", Behavior::Normal),
        ("stars", Behavior::Normal),
        ("broken", Behavior::FailSetup),
        ("crashy", Behavior::FailRender),
        ("panicky", Behavior::PanicRender),
        ("jittery", Behavior::PanicInterval),
    ] {
        let journal = journal.clone();
        registry.register(name, move |_config| {
            Box::new(MockApp {
                name: name.to_string(),
                behavior,
                journal: journal.clone(),
            })
        });
    }
    registry
}

struct Fixture {
    dir: TempDir,
    journal: Journal,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            journal: Journal::default(),
        }
    }

    fn state_path(&self) -> std::path::PathBuf {
        self.dir.path().join("state.json")
    }

    fn manager(&self, settings: ManagerSettings) -> (Manager, ManagerHandle) {
        let (matrix, _tap) = SimulatedMatrix::new(8, 4);
        Manager::new(
            Box::new(matrix),
            Arc::new(registry(&self.journal)),
            StateStore::new(self.state_path()),
            settings,
        )
    }

    fn saved(&self) -> Snapshot {
        StateStore::new(self.state_path()).try_load().unwrap()
    }
}

fn config(value: Value) -> AppConfig {
    value.as_object().cloned().unwrap()
}

fn secs(start: Instant, n: u64) -> Instant {
    start + Duration::from_secs(n)
}

#[tokio::test]
async fn switch_reconfigure_and_unknown_app() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);
    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("clock"));
    assert_eq!(state.config, AppConfig::new());

    fx.journal.clear();
    handle
        .update_config("clock", config(json!({"color": [1, 0, 0]})))
        .await
        .unwrap();
    manager.step(now);
    assert_eq!(fx.journal.lifecycle(), vec!["clock:update"]);
    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("clock"));
    assert_eq!(Value::Object(state.config), json!({"color": [1, 0, 0]}));

    assert_eq!(
        handle.switch_app("missing", None).await,
        Err(CommandError::UnknownApplication("missing".to_string()))
    );
    manager.step(now);
    assert_eq!(handle.current_state().active_app.as_deref(), Some("clock"));
}

#[tokio::test]
async fn old_app_is_torn_down_before_new_setup() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle.switch_app("clock", None).await.unwrap();
    handle.switch_app("scroll", None).await.unwrap();
    manager.step(now);

    assert_eq!(
        fx.journal.lifecycle(),
        vec!["clock:setup", "clock:teardown", "scroll:setup"]
    );
    assert_eq!(handle.current_state().active_app.as_deref(), Some("scroll"));
}

#[tokio::test]
async fn failed_setup_restores_previous_app() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);
    fx.journal.clear();
    let version = handle.current_state().version;
    let mut observer = handle.subscribe();
    assert!(matches!(observer.next().await, Some(StateEvent::FullState { .. })));

    let (result, ()) = tokio::join!(handle.switch_app_and_wait("broken", None), async {
        tokio::task::yield_now().await;
        manager.step(now);
    });

    assert!(matches!(result, Err(CommandError::SetupFailed { app, .. }) if app == "broken"));
    assert_eq!(
        fx.journal.lifecycle(),
        vec!["clock:teardown", "broken:setup", "clock:setup"]
    );
    assert_eq!(handle.current_state().active_app.as_deref(), Some("clock"));
    assert_eq!(fx.saved().last_running_app.as_deref(), Some("clock"));

    // Nothing observable changed, so nothing was committed
    assert_eq!(handle.current_state().version, version);
    handle.request_full_state().await.unwrap();
    manager.step(now);
    assert!(matches!(
        observer.next().await,
        Some(StateEvent::FullState { state }) if state.version == version
    ));
}

#[tokio::test]
async fn failed_setup_from_idle_leaves_device_idle() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());

    let (result, ()) = tokio::join!(handle.switch_app_and_wait("broken", None), async {
        tokio::task::yield_now().await;
        manager.step(Instant::now());
    });

    assert!(matches!(result, Err(CommandError::SetupFailed { .. })));
    assert_eq!(handle.current_state().active_app, None);
    assert!(!fx.state_path().exists() || fx.saved().last_running_app.is_none());
}

#[tokio::test]
async fn render_fault_stops_app_and_manager_recovers() {
    for faulty in ["crashy", "panicky"] {
        let fx = Fixture::new();
        let (mut manager, handle) = fx.manager(ManagerSettings::default());
        let now = Instant::now();

        handle.switch_app(faulty, None).await.unwrap();
        manager.step(now);

        assert_eq!(handle.current_state().active_app, None);
        assert!(fx.journal.lifecycle().contains(&format!("{}:teardown", faulty)));
        assert_eq!(fx.saved().last_running_app, None);

        handle.switch_app("clock", None).await.unwrap();
        manager.step(now);
        assert_eq!(handle.current_state().active_app.as_deref(), Some("clock"));
    }
}

#[tokio::test]
async fn stop_forgets_last_running_app() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);
    assert_eq!(fx.saved().last_running_app.as_deref(), Some("clock"));

    handle.stop().await.unwrap();
    manager.step(now);

    assert_eq!(handle.current_state().active_app, None);
    assert_eq!(fx.saved().last_running_app, None);
    assert!(fx.journal.lifecycle().ends_with(&["clock:teardown".to_string()]));
}

#[tokio::test]
async fn app_configs_are_remembered_per_app() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle
        .switch_app("clock", Some(config(json!({"color": [255, 0, 0]}))))
        .await
        .unwrap();
    handle
        .switch_app("stars", Some(config(json!({"spawn_rate": 5}))))
        .await
        .unwrap();
    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);

    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("clock"));
    assert_eq!(Value::Object(state.config), json!({"color": [255, 0, 0]}));
    assert_eq!(
        Value::Object(fx.saved().app_configs["stars"].clone()),
        json!({"spawn_rate": 5})
    );
}

#[tokio::test]
async fn reconfigure_inactive_app_only_updates_saved_config() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);
    fx.journal.clear();

    handle
        .update_config("scroll", config(json!({"text": "hi"})))
        .await
        .unwrap();
    manager.step(now);

    assert!(fx.journal.lifecycle().is_empty());
    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("clock"));
    assert_eq!(Value::Object(state.app_configs["scroll"].clone()), json!({"text": "hi"}));

    handle.switch_app("scroll", None).await.unwrap();
    manager.step(now);
    assert_eq!(Value::Object(handle.current_state().config), json!({"text": "hi"}));
}

#[tokio::test]
async fn rejected_reconfigure_keeps_last_good_config() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle
        .switch_app("clock", Some(config(json!({"color": [0, 0, 255]}))))
        .await
        .unwrap();
    manager.step(now);
    let version = handle.current_state().version;

    handle
        .update_config("clock", config(json!({"reject": true})))
        .await
        .unwrap();
    manager.step(now);

    let state = handle.current_state();
    assert_eq!(state.version, version);
    assert_eq!(Value::Object(state.config), json!({"color": [0, 0, 255]}));
}

#[tokio::test]
async fn unchanged_brightness_is_not_notified() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let mut observer = handle.subscribe();
    let now = Instant::now();

    assert!(matches!(observer.next().await, Some(StateEvent::FullState { .. })));

    handle.set_brightness(50).await.unwrap();
    handle.set_brightness(50).await.unwrap();
    manager.step(now);
    handle.set_brightness(50).await.unwrap();
    manager.step(now);
    handle.request_full_state().await.unwrap();
    manager.step(now);

    assert!(matches!(
        observer.next().await,
        Some(StateEvent::BrightnessChanged { brightness: 50, .. })
    ));
    // The next event is the requested resync: no duplicate brightness events
    assert!(matches!(
        observer.next().await,
        Some(StateEvent::FullState { state }) if state.brightness == 50
    ));
    assert_eq!(fx.saved().brightness, 50);
}

#[tokio::test]
async fn brightness_out_of_range_is_rejected() {
    let fx = Fixture::new();
    let (_manager, handle) = fx.manager(ManagerSettings::default());

    assert_eq!(handle.set_brightness(101).await, Err(CommandError::OutOfRange(101)));
    assert_eq!(handle.set_brightness(-1).await, Err(CommandError::OutOfRange(-1)));
    assert!(handle.set_brightness(0).await.is_ok());
    assert!(handle.set_brightness(100).await.is_ok());
}

#[tokio::test]
async fn invalid_carousel_is_rejected_without_change() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let before = handle.current_state().carousel;

    assert_eq!(
        handle.set_carousel(true, Vec::new()).await,
        Err(CommandError::EmptyEntries)
    );
    assert_eq!(
        handle
            .set_carousel(true, vec![CarouselEntry::new("nope", 5.0)])
            .await,
        Err(CommandError::UnknownApplication("nope".to_string()))
    );
    assert_eq!(
        handle
            .set_carousel(true, vec![CarouselEntry::new("clock", 0.0)])
            .await,
        Err(CommandError::NonPositiveDuration {
            app: "clock".to_string()
        })
    );

    manager.step(Instant::now());
    assert_eq!(handle.current_state().carousel, before);
}

#[tokio::test]
async fn carousel_rotates_and_wraps() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let start = Instant::now();

    handle
        .set_carousel(
            true,
            vec![
                CarouselEntry::new("clock", 5.0),
                CarouselEntry::new("scroll", 5.0),
                CarouselEntry::new("stars", 5.0),
            ],
        )
        .await
        .unwrap();
    manager.step(start);
    assert_eq!(handle.current_state().active_app.as_deref(), Some("clock"));
    fx.journal.clear();

    for t in 1..=16 {
        manager.step(secs(start, t));
    }

    let setups: Vec<_> = fx
        .journal
        .lifecycle()
        .into_iter()
        .filter(|e| e.ends_with(":setup"))
        .collect();
    assert_eq!(setups, vec!["scroll:setup", "stars:setup", "clock:setup"]);

    let state = handle.current_state();
    assert_eq!(state.carousel.current_index, 0);
    assert_eq!(state.active_app.as_deref(), Some("clock"));
    assert_eq!(fx.saved().carousel.current_index, 0);
}

#[tokio::test]
async fn external_switch_resets_carousel_timer() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let start = Instant::now();

    handle
        .set_carousel(
            true,
            vec![
                CarouselEntry::new("clock", 5.0),
                CarouselEntry::new("scroll", 5.0),
                CarouselEntry::new("stars", 5.0),
            ],
        )
        .await
        .unwrap();
    manager.step(start);

    // One unit before the pending tick
    handle.switch_app("stars", None).await.unwrap();
    manager.step(secs(start, 4));
    manager.step(secs(start, 5));
    manager.step(secs(start, 8));

    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("stars"));
    assert_eq!(state.carousel.current_index, 0);

    manager.step(secs(start, 9));
    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("scroll"));
    assert_eq!(state.carousel.current_index, 1);
}

#[tokio::test]
async fn disabling_carousel_keeps_position() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let start = Instant::now();
    let entries = vec![CarouselEntry::new("clock", 5.0), CarouselEntry::new("scroll", 5.0)];

    handle.set_carousel(true, entries.clone()).await.unwrap();
    manager.step(start);
    manager.step(secs(start, 5));
    assert_eq!(handle.current_state().carousel.current_index, 1);

    handle.set_carousel(false, entries.clone()).await.unwrap();
    manager.step(secs(start, 6));
    manager.step(secs(start, 60));
    let state = handle.current_state();
    assert!(!state.carousel.enabled);
    assert_eq!(state.carousel.current_index, 1);
    assert_eq!(state.carousel.entries, entries);
    assert_eq!(state.active_app.as_deref(), Some("scroll"));
}

#[tokio::test]
async fn restart_resumes_last_app_with_saved_config() {
    let fx = Fixture::new();
    StateStore::new(fx.state_path())
        .save(&Snapshot {
            last_running_app: Some("scroll".to_string()),
            app_configs: BTreeMap::from([("scroll".to_string(), config(json!({"speed": 3})))]),
            brightness: 30,
            ..Snapshot::default()
        })
        .unwrap();

    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    manager.resume(Instant::now());

    let state = handle.current_state();
    assert_eq!(state.active_app.as_deref(), Some("scroll"));
    assert_eq!(Value::Object(state.config), json!({"speed": 3}));
    assert_eq!(state.brightness, 30);
}

#[tokio::test]
async fn restart_with_deleted_app_starts_idle() {
    let fx = Fixture::new();
    StateStore::new(fx.state_path())
        .save(&Snapshot {
            last_running_app: Some("deleted".to_string()),
            ..Snapshot::default()
        })
        .unwrap();

    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    manager.resume(Instant::now());
    manager.step(Instant::now());

    assert_eq!(handle.current_state().active_app, None);
    assert!(fx.journal.lifecycle().is_empty());
}

#[tokio::test]
async fn initial_app_used_when_nothing_to_resume() {
    let fx = Fixture::new();
    let settings = ManagerSettings {
        initial_app: Some("stars".to_string()),
        ..ManagerSettings::default()
    };
    let (mut manager, handle) = fx.manager(settings);
    manager.resume(Instant::now());

    assert_eq!(handle.current_state().active_app.as_deref(), Some("stars"));
}

#[tokio::test]
async fn intents_drained_in_bounded_batches() {
    let fx = Fixture::new();
    let settings = ManagerSettings {
        max_intents_per_iteration: 2,
        ..ManagerSettings::default()
    };
    let (mut manager, handle) = fx.manager(settings);
    let now = Instant::now();

    for value in [10, 20, 30] {
        handle.set_brightness(value).await.unwrap();
    }

    manager.step(now);
    assert_eq!(handle.current_state().brightness, 20);
    manager.step(now);
    assert_eq!(handle.current_state().brightness, 30);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_with_overflow() {
    let fx = Fixture::new();
    let settings = ManagerSettings {
        command_queue_capacity: 1,
        enqueue_timeout: Duration::from_millis(10),
        ..ManagerSettings::default()
    };
    let (_manager, handle) = fx.manager(settings);

    handle.stop().await.unwrap();
    assert_eq!(handle.stop().await, Err(CommandError::ChannelOverflow));
}

#[tokio::test]
async fn dropped_manager_makes_handle_unavailable() {
    let fx = Fixture::new();
    let (manager, handle) = fx.manager(ManagerSettings::default());
    drop(manager);

    assert!(!handle.is_running());
    assert_eq!(handle.stop().await, Err(CommandError::ManagerUnavailable));
}

#[tokio::test]
async fn device_is_only_touched_by_control_thread() {
    let fx = Fixture::new();
    let (matrix, _tap) = SimulatedMatrix::new(8, 4);
    let (device, foreign) = ThreadBoundDevice::new(matrix);
    let (manager, handle) = Manager::new(
        Box::new(device),
        Arc::new(registry(&fx.journal)),
        StateStore::new(fx.state_path()),
        ManagerSettings::default(),
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let control = std::thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(manager.run(shutdown_rx));
    });

    // Concurrent producers
    let mut producers = Vec::new();
    for (i, app) in ["clock", "scroll", "stars"].into_iter().enumerate() {
        let handle = handle.clone();
        producers.push(tokio::spawn(async move {
            handle.set_brightness(10 * (i as i64 + 1)).await.unwrap();
            handle.switch_app(app, None).await.unwrap();
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    handle.switch_app("scroll", None).await.unwrap();

    let state = tokio::time::timeout(
        Duration::from_secs(5),
        handle
            .feed()
            .wait_for(|s| s.active_app.as_deref() == Some("scroll")),
    )
    .await
    .unwrap();
    assert_eq!(state.active_app.as_deref(), Some("scroll"));

    // Let the queue drain fully before shutting down
    handle.request_full_state().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();
    control.join().unwrap();

    assert_eq!(foreign.count(), 0);
    // Shutdown tears down but keeps the app for the next start
    assert_eq!(fx.saved().last_running_app.as_deref(), Some("scroll"));
}

#[tokio::test]
async fn panicking_frame_interval_falls_back_to_default() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let now = Instant::now();

    handle.switch_app("jittery", None).await.unwrap();
    manager.step(now);
    assert_eq!(handle.current_state().active_app.as_deref(), Some("jittery"));
    let interval = manager.running.as_ref().map(|running| running.frame_interval);
    assert_eq!(interval, Some(apps::DEFAULT_FRAME_INTERVAL));

    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);
    let interval = manager.running.as_ref().map(|running| running.frame_interval);
    assert_eq!(interval, Some(Duration::from_millis(20)));
}

#[tokio::test]
async fn extreme_star_settings_do_not_stop_control_loop() {
    let dir = tempfile::tempdir().unwrap();
    let (matrix, _tap) = SimulatedMatrix::new(8, 4);
    let (manager, handle) = Manager::new(
        Box::new(matrix),
        Arc::new(Registry::with_builtin_apps()),
        StateStore::new(dir.path().join("state.json")),
        ManagerSettings::default(),
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let control = std::thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(manager.run(shutdown_rx));
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        let result = handle
            .switch_app_and_wait("stars", Some(config(json!({"spawn_rate": 1e12}))))
            .await;
        assert!(matches!(result, Err(CommandError::SetupFailed { app, .. }) if app == "stars"));

        handle
            .switch_app_and_wait("stars", Some(config(json!({"fps": 1e-20}))))
            .await
            .unwrap();
        handle.switch_app_and_wait("clock", None).await.unwrap();
    })
    .await
    .unwrap();

    assert!(handle.is_running());
    assert_eq!(handle.current_state().active_app.as_deref(), Some("clock"));

    shutdown_tx.send(()).unwrap();
    control.join().unwrap();
}

#[tokio::test]
async fn failed_save_is_not_fatal_and_retried() {
    let fx = Fixture::new();
    // A directory where the state file belongs makes every save fail
    std::fs::create_dir_all(fx.state_path()).unwrap();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let mut observer = handle.subscribe();
    let now = Instant::now();
    assert!(matches!(observer.next().await, Some(StateEvent::FullState { .. })));

    handle.switch_app("clock", None).await.unwrap();
    manager.step(now);

    let state = handle.current_state();
    assert_eq!(state.version, 1);
    assert_eq!(state.active_app.as_deref(), Some("clock"));
    assert!(matches!(
        observer.next().await,
        Some(StateEvent::ActiveAppChanged { version: 1, app: Some(app), .. }) if app == "clock"
    ));
    assert!(fx.state_path().is_dir());

    std::fs::remove_dir(fx.state_path()).unwrap();
    handle.set_brightness(40).await.unwrap();
    manager.step(now);

    assert!(matches!(
        observer.next().await,
        Some(StateEvent::BrightnessChanged { version: 2, brightness: 40 })
    ));
    let saved = fx.saved();
    assert_eq!(saved.last_running_app.as_deref(), Some("clock"));
    assert_eq!(saved.brightness, 40);
}

#[tokio::test]
async fn enabling_carousel_on_running_entry_keeps_app() {
    let fx = Fixture::new();
    let (mut manager, handle) = fx.manager(ManagerSettings::default());
    let start = Instant::now();

    handle.switch_app("clock", None).await.unwrap();
    manager.step(start);
    fx.journal.clear();

    handle
        .set_carousel(
            true,
            vec![CarouselEntry::new("clock", 5.0), CarouselEntry::new("scroll", 5.0)],
        )
        .await
        .unwrap();
    manager.step(secs(start, 1));

    assert!(fx.journal.lifecycle().is_empty());
    let state = handle.current_state();
    assert!(state.carousel.enabled);
    assert_eq!(state.active_app.as_deref(), Some("clock"));

    // The timer restarted when the carousel was enabled
    manager.step(secs(start, 5));
    assert_eq!(handle.current_state().active_app.as_deref(), Some("clock"));
    manager.step(secs(start, 6));
    assert_eq!(handle.current_state().active_app.as_deref(), Some("scroll"));
}
