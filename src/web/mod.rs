//! Web server module for the control API.
//!
//! Provides the JSON API and the realtime observer socket using Axum.

pub mod routes;
pub mod ws;


use crate::display::FrameTap;
use crate::manager::ManagerHandle;
use axum::{
    routing::{get, post},
    Router,
};
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::cors::CorsLayer;

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Invalid bind address: {0}")]
    AddressError(String),

    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),

    #[error("Server error: {0}")]
    ServerError(String),
}

/// HTTP front end of the manager
pub struct WebServer {
    manager: ManagerHandle,
    frames: FrameTap,
    closing: Arc<watch::Sender<bool>>,
}

impl WebServer {
    /// Create a new web server
    pub fn new(manager: ManagerHandle, frames: FrameTap) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            manager,
            frames,
            closing: Arc::new(closing),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let state = AppState {
            manager: self.manager.clone(),
            frames: self.frames.clone(),
            closing: self.closing.subscribe(),
        };

        Router::new()
            .route("/api/apps", get(routes::list_apps))
            .route("/api/current", get(routes::current_app))
            .route("/api/state", get(routes::get_state))
            .route("/api/switch", post(routes::switch_app))
            .route("/api/stop", post(routes::stop_app))
            .route("/api/config", post(routes::update_current_config))
            .route(
                "/api/apps/:name/config",
                get(routes::get_app_config).post(routes::update_app_config),
            )
            .route(
                "/api/settings",
                get(routes::get_settings).post(routes::update_settings),
            )
            .route(
                "/api/carousel",
                get(routes::get_carousel).post(routes::update_carousel),
            )
            .route("/api/health", get(routes::health))
            .route("/api/frame.png", get(routes::frame_png))
            .route("/api/ws", get(ws::ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Run the web server with graceful shutdown
    pub async fn run_with_shutdown(
        &self,
        bind_address: &str,
        port: u16,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), WebError> {
        let addr: SocketAddr = format!("{}:{}", bind_address, port)
            .parse()
            .map_err(|e| WebError::AddressError(format!("{}:{}: {}", bind_address, port, e)))?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Web server listening on http://{}", addr);

        let closing = Arc::clone(&self.closing);
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                // Observer sockets would otherwise hold the shutdown open
                closing.send_replace(true);
                tracing::info!("Web server shutting down gracefully");
            })
            .await
            .map_err(|e| WebError::ServerError(e.to_string()))
    }
}
