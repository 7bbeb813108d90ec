//! Requested state changes and the errors producers can see.

use crate::apps::AppConfig;
use crate::state::CarouselConfig;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors surfaced to command producers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("App not found: {0}")]
    UnknownApplication(String),

    #[error("Failed to start app {app}: {reason}")]
    SetupFailed { app: String, reason: String },

    #[error("Brightness must be between 0 and 100, got {0}")]
    OutOfRange(i64),

    #[error("Carousel enabled but no apps specified")]
    EmptyEntries,

    #[error("Duration for '{app}' must be a positive number")]
    NonPositiveDuration { app: String },

    #[error("No application is running")]
    NoActiveApplication,

    #[error("Command queue is full, try again")]
    ChannelOverflow,

    #[error("Application manager is not running")]
    ManagerUnavailable,
}

/// Outcome channel for producers that want to see a switch commit
pub type SwitchReply = oneshot::Sender<Result<(), CommandError>>;

/// A queued request, consumed exactly once by the control loop
#[derive(Debug)]
pub enum Intent {
    SwitchApp {
        name: String,
        config: Option<AppConfig>,
        reply: Option<SwitchReply>,
    },
    Stop,
    Reconfigure {
        name: String,
        patch: AppConfig,
    },
    SetBrightness {
        value: u8,
    },
    SetCarousel {
        carousel: CarouselConfig,
    },
    RequestFullState,
}

impl Intent {
    /// Whether this intent overrides a pending carousel rotation
    pub fn preempts_carousel(&self) -> bool {
        matches!(self, Intent::SwitchApp { .. } | Intent::Stop)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Intent::SwitchApp { .. } => "switch",
            Intent::Stop => "stop",
            Intent::Reconfigure { .. } => "reconfigure",
            Intent::SetBrightness { .. } => "brightness",
            Intent::SetCarousel { .. } => "carousel",
            Intent::RequestFullState => "full_state",
        }
    }
}
