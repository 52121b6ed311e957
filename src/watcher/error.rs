//! Error types for the watch pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// Whether an error is fatal depends on where it surfaces, not on the
/// variant: a `PathWatchFailed` aborts startup but is only logged when a
/// directory appears at runtime.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot resolve root {path}: {reason}")]
    RootNotFound { path: PathBuf, reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventStream { details: String },

    #[error("Failed to spawn {name} thread: {reason}")]
    ThreadSpawn { name: String, reason: String },

    #[error("Index command failed for {root}: {reason}")]
    CommandFailed { root: PathBuf, reason: String },

    #[error("Cannot install {path}: {reason}")]
    Install { path: PathBuf, reason: String },

    #[error("Index command for {root} exceeded {secs}s and was killed")]
    Timeout { root: PathBuf, secs: u64 },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
