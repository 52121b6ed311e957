//! Wires roots, registry, event loop and dispatcher into one service.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::backend::NotifyBackend;
use super::command::{DEFAULT_COMMAND, DEFAULT_OUTPUT_NAME, IndexCommand};
use super::dispatcher::Dispatcher;
use super::event_loop::EventLoop;
use super::filter::OutputFilter;
use super::queue::{DirtyQueue, DirtySet};
use super::registry::WatchRegistry;
use super::{RootSet, WatchError};

/// Default pause between dispatcher cycles.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(60);

/// A running watch over a fixed set of roots.
///
/// The dispatcher thread is already started when this is returned; the
/// notification loop runs on whichever thread calls [`WatchService::run`].
pub struct WatchService {
    event_loop: EventLoop<NotifyBackend>,
    roots: Arc<RootSet>,
    /// Detached; never joined.
    _dispatcher: JoinHandle<()>,
}

impl WatchService {
    pub fn builder() -> WatchServiceBuilder {
        WatchServiceBuilder::new()
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// Number of directories currently watched.
    pub fn watch_count(&self) -> usize {
        self.event_loop.registry().len()
    }

    /// Process notifications until the stream fails.
    ///
    /// Only returns on a fatal error. The dispatcher thread is detached and
    /// ends with the process.
    pub fn run(self) -> Result<Infallible, WatchError> {
        self.event_loop.run()
    }
}

impl std::fmt::Debug for WatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchService")
            .field("roots", &self.roots.len())
            .field("watches", &self.watch_count())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`WatchService`].
#[derive(Debug, Clone)]
pub struct WatchServiceBuilder {
    roots: Vec<PathBuf>,
    wait_time: Duration,
    command: String,
    output_name: String,
    timeout: Option<Duration>,
    index_on_start: bool,
}

impl WatchServiceBuilder {
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            wait_time: DEFAULT_WAIT_TIME,
            command: DEFAULT_COMMAND.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            timeout: None,
            index_on_start: false,
        }
    }

    /// Add a root directory. Order determines root ids.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    pub fn roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Pause between dispatcher cycles.
    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Shell command template; the root path is appended as its last argument.
    pub fn command(mut self, template: impl Into<String>) -> Self {
        self.command = template.into();
        self
    }

    /// File name of the index written into each root.
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Queue every root for indexing before the first notification arrives.
    pub fn index_on_start(mut self, enabled: bool) -> Self {
        self.index_on_start = enabled;
        self
    }

    /// Resolve roots, subscribe every directory and start the dispatcher.
    ///
    /// Any failure here is fatal: a root that cannot be resolved or a
    /// directory that cannot be watched leaves the tree partially covered.
    pub fn build(self) -> Result<WatchService, WatchError> {
        if self.roots.is_empty() {
            return Err(WatchError::InitFailed {
                reason: "at least one root directory is required".to_string(),
            });
        }

        let roots = Arc::new(RootSet::resolve(&self.roots)?);
        let (backend, events) = NotifyBackend::new()?;

        let mut registry = WatchRegistry::new(backend);
        for root in roots.iter() {
            registry.walk(root)?;
        }

        let queue = Arc::new(DirtyQueue::with_capacity(roots.len()));
        if self.index_on_start {
            let all: DirtySet = roots.ids().collect();
            queue.merge(&all);
            crate::log_event!("dispatch", "initial index", "{} roots queued", all.len());
        }

        crate::log_event!(
            "dispatch",
            "configured",
            "`{}` -> {} every {:?}",
            self.command,
            self.output_name,
            self.wait_time
        );
        let command = IndexCommand::new(self.command, self.output_name.clone())
            .with_timeout(self.timeout);
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&roots),
            command,
            self.wait_time,
        )
        .spawn()?;

        let event_loop = EventLoop::new(
            registry,
            Arc::clone(&roots),
            events,
            queue,
            OutputFilter::new(&self.output_name),
        );

        Ok(WatchService {
            event_loop,
            roots,
            _dispatcher: dispatcher,
        })
    }
}

impl Default for WatchServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
