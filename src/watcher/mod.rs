//! Directory-tree watcher that re-runs an indexing command per root.
//!
//! # Architecture
//!
//! ```text
//! notify (one non-recursive watch per directory)
//!         |
//!     EventLoop ---- WatchRegistry (handle -> directory -> root)
//!         |
//!     DirtyQueue (flag-guarded set of root ids)
//!         |
//!     Dispatcher thread: drain, run IndexCommand per root, sleep
//! ```

mod backend;
mod command;
mod dispatcher;
mod error;
mod event_loop;
mod filter;
mod queue;
mod registry;
mod roots;
mod service;

pub use backend::{NotifyBackend, RawEvent, WatchBackend};
pub use command::{DEFAULT_COMMAND, DEFAULT_OUTPUT_NAME, IndexCommand, Reindex, ReindexOutcome};
pub use dispatcher::Dispatcher;
pub use error::WatchError;
pub use event_loop::{EventLoop, Notification, NotificationKind};
pub use filter::OutputFilter;
pub use queue::{DirtyQueue, DirtySet, ExclusionFlag, FlagGuard, Phase};
pub use registry::{WatchEntry, WatchHandle, WatchRegistry};
pub use roots::{RootId, RootPath, RootSet};
pub use service::{DEFAULT_WAIT_TIME, WatchService, WatchServiceBuilder};
