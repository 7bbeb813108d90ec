//! Matrix Server
//!
//! Runs one application at a time on an RGB LED matrix and lets remote
//! clients switch, stop, reconfigure, and rotate applications:
//! - a single control loop owns the display and the running application
//! - HTTP handlers only enqueue intents and read committed snapshots
//! - state survives restarts through an atomically written JSON file
//! - observers get every committed change over a WebSocket

pub mod apps;
pub mod config;
pub mod display;
pub mod manager;
pub mod notifier;
pub mod state;
pub mod web;
