pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings};
pub use watcher::{WatchError, WatchService, WatchServiceBuilder};
