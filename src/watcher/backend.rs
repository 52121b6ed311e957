//! Subscription to OS change notifications.
//!
//! The registry only needs one capability from the platform: subscribe a
//! single directory, non-recursively. [`WatchBackend`] is that seam;
//! [`NotifyBackend`] implements it on top of `notify`, forwarding raw events
//! into a channel that the event loop blocks on.

use std::path::Path;

use crossbeam_channel::{Receiver, unbounded};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::WatchError;

/// One raw item from the notification stream.
pub type RawEvent = notify::Result<Event>;

/// Subscribes directories to change notifications.
pub trait WatchBackend: Send {
    /// Start delivering notifications for the direct children of `dir`.
    fn add_watch(&mut self, dir: &Path) -> Result<(), WatchError>;
}

/// [`WatchBackend`] over the platform's recommended `notify` watcher.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Initialize the notification facility.
    ///
    /// Returns the backend and the receiving end of its event stream. The
    /// stream is disconnected when the backend is dropped.
    pub fn new() -> Result<(Self, Receiver<RawEvent>), WatchError> {
        let (tx, rx) = unbounded();

        let watcher = notify::recommended_watcher(move |res: RawEvent| {
            // Only fails once the event loop is gone, at which point the
            // process is exiting anyway.
            let _ = tx.send(res);
        })?;

        Ok((Self { watcher }, rx))
    }
}

impl WatchBackend for NotifyBackend {
    fn add_watch(&mut self, dir: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend").finish_non_exhaustive()
    }
}
