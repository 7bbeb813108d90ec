//! Matrix Server entry point
//!
//! Wires the simulated matrix, the application registry, the control loop
//! and the web server together, then runs until SIGINT/SIGTERM.

use anyhow::Context;
use clap::Parser;
use matrix_server::apps::Registry;
use matrix_server::config::{Config, DEFAULT_CONFIG_PATH};
use matrix_server::display::{SimulatedMatrix, ThreadBoundDevice};
use matrix_server::manager::Manager;
use matrix_server::state::StateStore;
use matrix_server::web::WebServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "matrix-server")]
#[command(about = "Remote-controlled application server for RGB LED matrices")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Web server port (overrides config, default: 5000)
    #[arg(long = "http-port")]
    http_port: Option<u16>,

    /// State file path (overrides config)
    #[arg(long = "state-file")]
    state_file: Option<PathBuf>,

    /// App to start when there is no saved session
    #[arg(long)]
    app: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the default configuration to --config and exit
    #[arg(long = "init-config")]
    init_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        Config::default()
            .save(&args.config)
            .with_context(|| format!("writing {}", args.config.display()))?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    let mut config = Config::load(&args.config).unwrap_or_else(|e| {
        eprintln!(
            "Failed to load config from {}: {}, using defaults",
            args.config.display(),
            e
        );
        Config::default()
    });
    if let Some(port) = args.http_port {
        config.web_port = port;
    }
    if let Some(path) = args.state_file {
        config.state_path = path;
    }
    if args.app.is_some() {
        config.initial_app = args.app;
    }
    config.verbose |= args.verbose;
    config.validate()?;

    init_logging(config.verbose);
    tracing::info!("Starting Matrix Server");

    let registry = Arc::new(Registry::with_builtin_apps());
    if let Some(app) = config.initial_app.as_deref().filter(|app| !registry.contains(app)) {
        tracing::warn!("Initial app '{}' is not registered, ignoring it", app);
    }

    let (matrix, frames) = SimulatedMatrix::new(config.matrix_width, config.matrix_height);
    let (device, cross_thread_calls) = ThreadBoundDevice::new(matrix);
    let (manager, handle) = Manager::new(
        Box::new(device),
        Arc::clone(&registry),
        StateStore::new(&config.state_path),
        config.manager_settings(),
    );

    // Setup shutdown signal handling
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // The control loop owns the device, on its own thread and runtime
    let control_shutdown = shutdown_tx.subscribe();
    let control_handle = std::thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!("Failed to start control loop runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(manager.run(control_shutdown));
        })
        .context("spawning control loop thread")?;

    // Spawn web server task
    let web_server = WebServer::new(handle, frames);
    let web_shutdown = shutdown_tx.subscribe();
    let bind_address = config.bind_address.clone();
    let port = config.web_port;
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server
            .run_with_shutdown(&bind_address, port, web_shutdown)
            .await
        {
            tracing::error!("Web server error: {}", e);
        }
    });

    // Wait for shutdown signal
    wait_for_shutdown().await?;
    tracing::info!("Shutdown signal received");

    // Send shutdown to all tasks
    let _ = shutdown_tx.send(());

    // Wait for tasks to complete with timeout
    tokio::select! {
        _ = web_handle => {},
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            tracing::warn!("Web server shutdown timeout");
        }
    }

    let control_join = tokio::task::spawn_blocking(move || control_handle.join());
    tokio::select! {
        result = control_join => {
            if !matches!(result, Ok(Ok(()))) {
                tracing::error!("Control loop thread panicked");
            }
        },
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            tracing::warn!("Control loop shutdown timeout");
        }
    }

    let foreign = cross_thread_calls.count();
    if foreign > 0 {
        tracing::warn!("Device was touched {} times outside the control loop", foreign);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
///
/// Use --verbose flag for "debug" level during development/troubleshooting.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("matrix_server={}", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
