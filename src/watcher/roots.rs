//! The fixed set of top-level directories given at startup.

use std::fmt;
use std::path::{Path, PathBuf};

use super::WatchError;

/// Stable identifier of a top-level root, assigned in argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RootId(u32);

impl RootId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A root directory and its canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPath {
    pub id: RootId,
    pub path: PathBuf,
}

/// Immutable list of roots. Shared read-only between threads.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    roots: Vec<RootPath>,
}

impl RootSet {
    /// Canonicalize every argument and assign ids.
    ///
    /// A path that does not exist or is not a directory is fatal. A path that
    /// canonicalizes to a root
    /// already in the set is dropped so each tree is indexed once per cycle.
    pub fn resolve<I, P>(paths: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut canonical = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let resolved = path
                .canonicalize()
                .map_err(|e| WatchError::RootNotFound {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            if !resolved.is_dir() {
                return Err(WatchError::RootNotFound {
                    path: path.to_path_buf(),
                    reason: "not a directory".to_string(),
                });
            }
            canonical.push(resolved);
        }
        Ok(Self::from_canonical(canonical))
    }

    /// Build a set from paths that are already canonical.
    pub fn from_canonical(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut roots: Vec<RootPath> = Vec::new();
        for path in paths {
            if roots.iter().any(|r| r.path == path) {
                tracing::warn!("[roots] duplicate root ignored: {}", path.display());
                continue;
            }
            let id = RootId::new(roots.len() as u32);
            roots.push(RootPath { id, path });
        }
        Self { roots }
    }

    pub fn get(&self, id: RootId) -> Option<&RootPath> {
        self.roots.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RootPath> {
        self.roots.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = RootId> + '_ {
        self.roots.iter().map(|r| r.id)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
