//! The single consumer of raw change notifications.
//!
//! Each cycle blocks for the next notification, then takes whatever else is
//! already pending, resolves every notification to its root, and merges the
//! roots it touched into the shared queue in one step.

use std::convert::Infallible;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind};

use super::backend::{RawEvent, WatchBackend};
use super::filter::OutputFilter;
use super::queue::{DirtyQueue, DirtySet};
use super::registry::{WatchHandle, WatchRegistry};
use super::{RootSet, WatchError};

/// Coarse kind of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Create,
    Modify,
    Remove,
    Rename,
    Other,
}

/// A raw event resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Watch of the directory the change happened in.
    pub handle: WatchHandle,
    /// Name of the affected entry inside that directory.
    pub name: OsString,
    pub path: PathBuf,
    pub kind: NotificationKind,
    /// The entry is a directory that just appeared in the tree.
    pub creates_directory: bool,
}

impl Notification {
    /// Resolve one path of `kind` to the watch of its parent directory.
    ///
    /// Returns `None` for paths outside every watched directory, such as a
    /// root itself being removed.
    pub fn resolve<B: WatchBackend>(
        registry: &WatchRegistry<B>,
        kind: &EventKind,
        path: &Path,
    ) -> Option<Self> {
        let parent = path.parent()?;
        let name = path.file_name()?.to_os_string();
        let handle = registry.handle_for(parent)?;

        let (kind, creates_directory) = match kind {
            EventKind::Create(CreateKind::Folder) => (NotificationKind::Create, true),
            EventKind::Create(CreateKind::File) => (NotificationKind::Create, false),
            EventKind::Create(_) => (NotificationKind::Create, is_directory(path)),
            EventKind::Modify(ModifyKind::Name(_)) => {
                (NotificationKind::Rename, is_directory(path))
            }
            EventKind::Modify(_) => (NotificationKind::Modify, false),
            EventKind::Remove(_) => (NotificationKind::Remove, false),
            EventKind::Any | EventKind::Other | EventKind::Access(_) => {
                (NotificationKind::Other, false)
            }
        };

        Some(Self {
            handle,
            name,
            path: path.to_path_buf(),
            kind,
            creates_directory,
        })
    }
}

/// Directory without following symlinks.
fn is_directory(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Observes notifications and feeds dirty roots to the dispatcher.
pub struct EventLoop<B> {
    registry: WatchRegistry<B>,
    roots: Arc<RootSet>,
    events: Receiver<RawEvent>,
    queue: Arc<DirtyQueue>,
    filter: OutputFilter,
    dirty: DirtySet,
}

impl<B: WatchBackend> EventLoop<B> {
    pub fn new(
        registry: WatchRegistry<B>,
        roots: Arc<RootSet>,
        events: Receiver<RawEvent>,
        queue: Arc<DirtyQueue>,
        filter: OutputFilter,
    ) -> Self {
        let dirty = DirtySet::with_capacity(roots.len());
        Self {
            registry,
            roots,
            events,
            queue,
            filter,
            dirty,
        }
    }

    /// Process notifications until the stream fails.
    pub fn run(mut self) -> Result<Infallible, WatchError> {
        crate::log_event!(
            "events",
            "started",
            "{} roots, {} directories",
            self.roots.len(),
            self.registry.len()
        );
        loop {
            self.step()?;
        }
    }

    /// One read cycle: wait, process everything pending, flush.
    ///
    /// Returns the number of roots marked dirty in this cycle.
    pub fn step(&mut self) -> Result<usize, WatchError> {
        let first = self.events.recv().map_err(|_| WatchError::EventStream {
            details: "notification channel closed".to_string(),
        })?;
        self.process(first)?;

        while let Ok(raw) = self.events.try_recv() {
            self.process(raw)?;
        }

        Ok(self.flush())
    }

    fn process(&mut self, raw: RawEvent) -> Result<(), WatchError> {
        let event = raw.map_err(|e| WatchError::EventStream {
            details: e.to_string(),
        })?;
        self.handle_event(&event);
        Ok(())
    }

    /// Apply one event to the local dirty set and the registry.
    pub fn handle_event(&mut self, event: &Event) {
        if event.need_rescan() {
            tracing::warn!("[events] notifications were dropped, marking every root dirty");
            for id in self.roots.ids() {
                self.dirty.insert(id);
            }
        }

        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        for path in &event.paths {
            match Notification::resolve(&self.registry, &event.kind, path) {
                Some(notification) => self.apply(notification),
                None => {
                    crate::debug_event!(
                        "events",
                        "unwatched",
                        "{:?} {}",
                        event.kind,
                        path.display()
                    );
                }
            }
        }
    }

    fn apply(&mut self, notification: Notification) {
        if self.filter.is_ignored(&notification.name) {
            crate::debug_event!("events", "ignored own output", "{}", notification.path.display());
            return;
        }

        let Some(root) = self
            .registry
            .resolve(notification.handle)
            .map(|entry| entry.root)
        else {
            return;
        };

        if self.dirty.insert(root) {
            crate::debug_event!(
                "events",
                "dirty",
                "{root} via {:?} {}",
                notification.kind,
                notification.path.display()
            );
        }

        if notification.creates_directory {
            let added = self.registry.extend(&notification.path, root);
            if added > 0 {
                crate::debug_event!(
                    "events",
                    "new directory",
                    "{} (+{added} watches)",
                    notification.path.display()
                );
            }
        }
    }

    /// Merge this cycle's roots into the shared queue and reset.
    fn flush(&mut self) -> usize {
        let marked = self.dirty.len();
        if marked > 0 {
            self.queue.merge(&self.dirty);
            self.dirty.clear();
        }
        marked
    }

    pub fn registry(&self) -> &WatchRegistry<B> {
        &self.registry
    }
}

impl<B> std::fmt::Debug for EventLoop<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("roots", &self.roots.len())
            .field("pending", &self.dirty.len())
            .finish_non_exhaustive()
    }
}
