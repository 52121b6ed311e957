//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Watch directory trees and rebuild their tags files
#[derive(Parser, Debug)]
#[command(
    name = "watchtags",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch directory trees and rebuild their tags files",
    long_about = "Watch each ROOT recursively and, whenever something inside it changes, \
                  re-run the index command for that root. The command's standard output \
                  replaces ROOT/tags.",
    after_help = "Examples:\n  \
                  watchtags ~/src/project\n  \
                  watchtags -w 10 src vendor\n  \
                  WATCHTAGS_CMD='ctags -R -f - --languages=C' watchtags .\n\n\
                  Environment:\n  \
                  WATCHTAGS_WAIT_TIME   seconds between index runs (default 60)\n  \
                  WATCHTAGS_CMD         index command; the root is appended\n  \
                  WATCHTAGS_TIMEOUT     seconds before a command is killed",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Directories to watch
    #[arg(value_name = "ROOT", required_unless_present = "print_config")]
    pub roots: Vec<PathBuf>,

    /// Path to a TOML settings file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds to wait between index runs (overrides config)
    #[arg(short, long, value_name = "SECS")]
    pub wait_time: Option<u64>,

    /// Index command template; the root is appended as its last argument
    #[arg(long, value_name = "TEMPLATE")]
    pub cmd: Option<String>,

    /// Kill an index command running longer than this (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Index every root once at startup
    #[arg(long)]
    pub index_on_start: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the effective settings as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Apply flags on top of loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(wait_time) = self.wait_time {
            settings.wait_time = wait_time;
        }
        if let Some(cmd) = self.cmd.as_ref().filter(|c| !c.trim().is_empty()) {
            settings.cmd = cmd.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = (timeout > 0).then_some(timeout);
        }
        if self.verbose {
            settings.logging.default = "debug".to_string();
        }
    }
}
