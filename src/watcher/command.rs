//! Invocation of the external indexing command.
//!
//! The command runs through `/bin/sh -c` with the root's path appended as
//! the final (quoted) argument and the root as its working directory. Its
//! standard output goes to a staging file inside the root, which replaces
//! `<root>/<output-name>` in a single rename once the command exits.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use super::filter::{STAGING_SUFFIX, staging_prefix};
use super::{RootPath, WatchError};

/// Default indexing command; writes the tags to standard output.
pub const DEFAULT_COMMAND: &str = "ctags -R -f -";

/// Default name of the index file written into each root.
pub const DEFAULT_OUTPUT_NAME: &str = "tags";

const SHELL: &str = "/bin/sh";

/// `$0` of the shell, shown in its error messages.
const SHELL_ARGV0: &str = "watchtags";

/// How often a command with a deadline is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of one completed index run.
#[derive(Debug, Clone)]
pub struct ReindexOutcome {
    pub status: ExitStatus,
    /// Installed index file.
    pub output: PathBuf,
    pub elapsed: Duration,
}

/// Something that can rebuild the index of a root.
pub trait Reindex: Send {
    fn reindex(&self, root: &RootPath) -> Result<ReindexOutcome, WatchError>;
}

/// The configured shell command.
#[derive(Debug, Clone)]
pub struct IndexCommand {
    template: String,
    output_name: String,
    timeout: Option<Duration>,
}

impl IndexCommand {
    pub fn new(template: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            output_name: output_name.into(),
            timeout: None,
        }
    }

    /// Kill the command if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for `root`. The working directory is always explicit.
    ///
    /// On unix the shell leads its own process group so a timeout can stop
    /// everything it started.
    fn command_for(&self, root: &Path) -> Command {
        let mut cmd = Command::new(SHELL);
        cmd.arg("-c")
            .arg(format!("{} \"$1\"", self.template))
            .arg(SHELL_ARGV0)
            .arg(root)
            .current_dir(root)
            .stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    fn staging_file(&self, root: &Path) -> Result<NamedTempFile, WatchError> {
        tempfile::Builder::new()
            .prefix(&staging_prefix(&self.output_name))
            .suffix(STAGING_SUFFIX)
            .tempfile_in(root)
            .map_err(|e| WatchError::CommandFailed {
                root: root.to_path_buf(),
                reason: format!("cannot create staging file: {e}"),
            })
    }

    fn wait(&self, child: &mut Child, root: &Path) -> Result<ExitStatus, WatchError> {
        let failed = |e: std::io::Error| WatchError::CommandFailed {
            root: root.to_path_buf(),
            reason: e.to_string(),
        };

        let Some(limit) = self.timeout else {
            return child.wait().map_err(failed);
        };

        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait().map_err(failed)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                kill_group(child);
                let _ = child.wait();
                return Err(WatchError::Timeout {
                    root: root.to_path_buf(),
                    secs: limit.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for IndexCommand {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND, DEFAULT_OUTPUT_NAME)
    }
}

impl Reindex for IndexCommand {
    fn reindex(&self, root: &RootPath) -> Result<ReindexOutcome, WatchError> {
        let started = Instant::now();
        let staging = self.staging_file(&root.path)?;
        let stdout = staging
            .as_file()
            .try_clone()
            .map_err(|e| WatchError::CommandFailed {
                root: root.path.clone(),
                reason: e.to_string(),
            })?;

        crate::log_event!("dispatch", "running", "{} {}", self.template, root.path.display());

        let mut child = self
            .command_for(&root.path)
            .stdout(Stdio::from(stdout))
            .spawn()
            .map_err(|e| WatchError::CommandFailed {
                root: root.path.clone(),
                reason: e.to_string(),
            })?;

        // On timeout the staging file is dropped (and deleted) here, leaving
        // the previous index in place.
        let status = self.wait(&mut child, &root.path)?;

        let output = root.path.join(&self.output_name);
        install(staging, &output)?;

        Ok(ReindexOutcome {
            status,
            output,
            elapsed: started.elapsed(),
        })
    }
}

/// Kill `child` and every process in its group.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall; a negative pid addresses the group led by `child`.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
            return;
        }
    }
    let _ = child.kill();
}

/// Atomically move the staging file over `target`.
fn install(staging: NamedTempFile, target: &Path) -> Result<(), WatchError> {
    let failed = |reason: String| WatchError::Install {
        path: target.to_path_buf(),
        reason,
    };

    // Staging files are created owner-only; the index is meant to be shared.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o644))
            .map_err(|e| failed(e.to_string()))?;
    }

    staging
        .persist(target)
        .map(|_| ())
        .map_err(|e| failed(e.error.to_string()))
}
