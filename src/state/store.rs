//! JSON file storage for the manager snapshot.

use super::Snapshot;
use crate::display::MAX_BRIGHTNESS;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// State file errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse state JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    Invalid(String),
}

/// Write a file atomically
///
/// Uses a write-to-temp-then-rename pattern so a crash or power loss
/// mid-write leaves the previous file intact.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, content)?;

    // Atomic rename - either fully succeeds or fails, never partial
    std::fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp_path);
    })
}

/// Snapshot persistence backed by a single JSON file
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, reporting why it could not be used
    pub fn try_load(&self) -> Result<Snapshot, StoreError> {
        let content = std::fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;

        if snapshot.brightness > MAX_BRIGHTNESS {
            return Err(StoreError::Invalid(format!(
                "brightness {} out of range 0-{}",
                snapshot.brightness, MAX_BRIGHTNESS
            )));
        }

        Ok(snapshot)
    }

    /// Read the snapshot, falling back to an empty one on any problem
    pub fn load(&self) -> Snapshot {
        match self.try_load() {
            Ok(snapshot) => {
                tracing::info!("Loaded state from {}", self.path.display());
                snapshot
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting fresh", self.path.display());
                Snapshot::default()
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unusable state file {}: {}",
                    self.path.display(),
                    e
                );
                Snapshot::default()
            }
        }
    }

    /// Persist the snapshot atomically
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.path, &content)?;
        tracing::debug!("State saved to {}", self.path.display());
        Ok(())
    }
}
