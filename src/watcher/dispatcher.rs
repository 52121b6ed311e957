//! Background worker that re-indexes dirty roots.
//!
//! Drain, invoke once per root, sleep, repeat. The fixed sleep is the only
//! debounce: whatever changes while the worker is busy or asleep collects in
//! the queue and is handled by the next drain as a single batch.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::command::Reindex;
use super::queue::DirtyQueue;
use super::{RootSet, WatchError};

pub const THREAD_NAME: &str = "watchtags-dispatch";

/// Drains the dirty queue and runs the index command.
pub struct Dispatcher<R> {
    queue: Arc<DirtyQueue>,
    roots: Arc<RootSet>,
    reindex: R,
    wait_time: Duration,
}

impl<R: Reindex + 'static> Dispatcher<R> {
    pub fn new(
        queue: Arc<DirtyQueue>,
        roots: Arc<RootSet>,
        reindex: R,
        wait_time: Duration,
    ) -> Self {
        Self {
            queue,
            roots,
            reindex,
            wait_time,
        }
    }

    /// Drain the queue and re-index each root in the batch once.
    ///
    /// Failures are logged and do not stop the batch. Returns the number of
    /// roots the command was attempted for.
    pub fn run_cycle(&self) -> usize {
        let batch = self.queue.drain();
        let mut attempted = 0;

        for id in batch {
            let Some(root) = self.roots.get(id) else {
                tracing::error!("[dispatch] unknown root {id}, skipping");
                continue;
            };
            attempted += 1;

            match self.reindex.reindex(root) {
                Ok(outcome) if outcome.status.success() => {
                    crate::log_event!(
                        "dispatch",
                        "indexed",
                        "{} in {:.2?}",
                        outcome.output.display(),
                        outcome.elapsed
                    );
                }
                Ok(outcome) => {
                    tracing::warn!(
                        "[dispatch] index command exited with {} for {}; \
                         installed its output anyway",
                        outcome.status,
                        root.path.display()
                    );
                }
                Err(e) => {
                    tracing::error!("[dispatch] {e}");
                }
            }
        }

        attempted
    }

    /// Run forever.
    pub fn run(self) {
        crate::debug_event!("dispatch", "started", "wait time {:?}", self.wait_time);
        loop {
            self.run_cycle();
            thread::sleep(self.wait_time);
        }
    }

    /// Start [`Dispatcher::run`] on its own named thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, WatchError> {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(|e| WatchError::ThreadSpawn {
                name: THREAD_NAME.to_string(),
                reason: e.to_string(),
            })
    }
}

impl<R> std::fmt::Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("roots", &self.roots.len())
            .field("wait_time", &self.wait_time)
            .finish_non_exhaustive()
    }
}
