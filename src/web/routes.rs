//! HTTP route handlers for the JSON API.
//!
//! Handlers never touch the matrix: mutations are queued on the manager
//! handle and reads come from the last committed state view.

use crate::apps::AppConfig;
use crate::display::FrameTap;
use crate::manager::{CommandError, ManagerHandle};
use crate::state::{CarouselConfig, CarouselEntry};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: ManagerHandle,
    pub frames: FrameTap,
    /// Flips to true when the server starts shutting down
    pub closing: watch::Receiver<bool>,
}

/// Error response with a JSON `{error}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        let status = match &e {
            CommandError::Validation(_)
            | CommandError::OutOfRange(_)
            | CommandError::EmptyEntries
            | CommandError::NonPositiveDuration { .. } => StatusCode::BAD_REQUEST,
            CommandError::UnknownApplication(_) => StatusCode::NOT_FOUND,
            CommandError::NoActiveApplication => StatusCode::CONFLICT,
            CommandError::SetupFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CommandError::ChannelOverflow | CommandError::ManagerUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Request body for POST /api/switch
#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub app: String,
    #[serde(default)]
    pub config: Option<AppConfig>,
    /// Wait for the switch to be committed before answering
    #[serde(default)]
    pub wait: bool,
}

/// Carousel entry as it travels over HTTP
#[derive(Debug, Serialize, Deserialize)]
pub struct CarouselEntryBody {
    pub app: String,
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
pub struct CarouselRequest {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub apps: Vec<CarouselEntryBody>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    #[serde(default)]
    pub brightness: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub since: Option<u64>,
}

fn carousel_body(carousel: &CarouselConfig) -> Value {
    let apps: Vec<CarouselEntryBody> = carousel
        .entries
        .iter()
        .map(|entry| CarouselEntryBody {
            app: entry.app.clone(),
            duration: entry.duration_seconds,
        })
        .collect();
    json!({
        "enabled": carousel.enabled,
        "apps": apps,
        "currentIndex": carousel.current_index,
    })
}

/// GET /api/apps
pub async fn list_apps(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "apps": state.manager.available_apps(),
        "current": state.manager.current_state().active_app,
    }))
}

/// GET /api/current
pub async fn current_app(State(state): State<AppState>) -> Json<Value> {
    let view = state.manager.current_state();
    Json(json!({ "app": view.active_app, "config": view.config }))
}

/// GET /api/state?since=N - polling form of the realtime feed
pub async fn get_state(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> Json<Value> {
    let view = match query.since {
        Some(version) => match state.manager.state_since(version) {
            Some(view) => view,
            None => {
                let version = state.manager.current_state().version;
                return Json(json!({ "changed": false, "version": version }));
            }
        },
        None => state.manager.current_state(),
    };
    Json(json!(view))
}

/// POST /api/switch
pub async fn switch_app(
    State(state): State<AppState>,
    body: Result<Json<SwitchRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    if request.app.trim().is_empty() {
        return Err(ApiError::bad_request("Missing app name"));
    }

    if request.wait {
        state
            .manager
            .switch_app_and_wait(&request.app, request.config)
            .await?;
    } else {
        state.manager.switch_app(&request.app, request.config).await?;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "app": request.app })),
    ))
}

/// POST /api/stop
pub async fn stop_app(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.manager.stop().await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /api/config - reconfigure the running app
pub async fn update_current_config(
    State(state): State<AppState>,
    body: Result<Json<AppConfig>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(patch) = body?;
    if patch.is_empty() {
        return Err(ApiError::bad_request("Missing configuration data"));
    }

    let app = state.manager.update_active_config(patch).await?;
    Ok(Json(json!({ "success": true, "app": app })))
}

/// GET /api/apps/:name/config
pub async fn get_app_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.manager.is_registered(&name) {
        return Err(CommandError::UnknownApplication(name).into());
    }

    let config = state
        .manager
        .current_state()
        .app_configs
        .remove(&name)
        .unwrap_or_default();
    Ok(Json(json!({ "app": name, "config": config })))
}

/// POST /api/apps/:name/config
pub async fn update_app_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<AppConfig>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    if !state.manager.is_registered(&name) {
        return Err(CommandError::UnknownApplication(name).into());
    }
    let Json(patch) = body?;
    if patch.is_empty() {
        return Err(ApiError::bad_request("Missing configuration data"));
    }

    state.manager.update_config(&name, patch).await?;
    Ok(Json(json!({ "success": true, "app": name })))
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "brightness": state.manager.current_state().brightness }))
}

/// POST /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    body: Result<Json<SettingsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;

    if let Some(value) = request.brightness {
        let brightness = value.as_i64().ok_or_else(|| {
            ApiError::bad_request("Brightness must be an integer between 0 and 100")
        })?;
        state.manager.set_brightness(brightness).await?;
    }

    Ok(Json(json!({ "success": true })))
}

/// GET /api/carousel
pub async fn get_carousel(State(state): State<AppState>) -> Json<Value> {
    Json(carousel_body(&state.manager.current_state().carousel))
}

/// POST /api/carousel
pub async fn update_carousel(
    State(state): State<AppState>,
    body: Result<Json<CarouselRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    let entries: Vec<CarouselEntry> = request
        .apps
        .iter()
        .map(|entry| CarouselEntry::new(&entry.app, entry.duration))
        .collect();

    state.manager.set_carousel(request.enabled, entries).await?;
    Ok(Json(json!({
        "success": true,
        "enabled": request.enabled,
        "apps": request.apps,
    })))
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "managerRunning": state.manager.is_running(),
        "currentApp": state.manager.current_state().active_app,
    }))
}

/// GET /api/frame.png - what the matrix shows right now
pub async fn frame_png(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let frame = state.frames.latest();
    let mut png = Vec::new();
    frame
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ApiError::internal(format!("Failed to encode frame: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        png,
    ))
}
