//! Registry of watched directories.
//!
//! Maps each subscribed directory to the root it belongs to. Every directory
//! below a root is watched individually (non-recursively), so the table grows
//! as directories are created. Entries are append-only: a deleted directory
//! keeps its entry for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use super::backend::WatchBackend;
use super::{RootId, RootPath, WatchError};

/// Opaque key of a registered directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

/// A watched directory and the root it maps back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub handle: WatchHandle,
    pub root: RootId,
    pub path: PathBuf,
}

/// How a walk treats a failed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnWatchFailure {
    /// Abort the walk and return the error.
    Abort,
    /// Log it and leave the directory unwatched.
    Skip,
}

/// Growable table of watched directories.
#[derive(Debug)]
pub struct WatchRegistry<B> {
    backend: B,
    entries: HashMap<WatchHandle, WatchEntry>,
    by_path: HashMap<PathBuf, WatchHandle>,
    next_handle: u64,
}

impl<B: WatchBackend> WatchRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
            by_path: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Subscribe `path` and record it under `root`.
    ///
    /// A directory that is already registered is subscribed again (it may
    /// have been deleted and re-created) and keeps its handle.
    pub fn register(&mut self, path: &Path, root: RootId) -> Result<WatchHandle, WatchError> {
        self.backend.add_watch(path)?;

        if let Some(&handle) = self.by_path.get(path) {
            return Ok(handle);
        }

        let handle = WatchHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(
            handle,
            WatchEntry {
                handle,
                root,
                path: path.to_path_buf(),
            },
        );
        self.by_path.insert(path.to_path_buf(), handle);
        crate::debug_event!("registry", "watching", "{} ({root})", path.display());
        Ok(handle)
    }

    pub fn resolve(&self, handle: WatchHandle) -> Option<&WatchEntry> {
        self.entries.get(&handle)
    }

    /// Handle of the entry registered for exactly `dir`.
    pub fn handle_for(&self, dir: &Path) -> Option<WatchHandle> {
        self.by_path.get(dir).copied()
    }

    /// Initial recursive registration of a root.
    ///
    /// Unreadable entries are logged and skipped; a directory that cannot be
    /// subscribed aborts the walk, since the root would be partially covered.
    pub fn walk(&mut self, root: &RootPath) -> Result<usize, WatchError> {
        let count = self.walk_from(&root.path, root.id, OnWatchFailure::Abort)?;
        crate::log_event!(
            "registry",
            "root ready",
            "{} ({} directories)",
            root.path.display(),
            count
        );
        Ok(count)
    }

    /// Register a directory that appeared at runtime, plus anything already
    /// created beneath it.
    ///
    /// Best effort: failures leave the affected directories unwatched.
    pub fn extend(&mut self, dir: &Path, root: RootId) -> usize {
        if dir.file_name().is_some_and(is_reserved_name) {
            return 0;
        }
        match self.walk_from(dir, root, OnWatchFailure::Skip) {
            Ok(count) => count,
            // Skip never aborts
            Err(e) => {
                tracing::warn!("[registry] failed to extend {}: {e}", dir.display());
                0
            }
        }
    }

    fn walk_from(
        &mut self,
        start: &Path,
        root: RootId,
        on_failure: OnWatchFailure,
    ) -> Result<usize, WatchError> {
        let mut registered = 0;

        let walker = WalkDir::new(start)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_reserved(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[registry] skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            match self.register(entry.path(), root) {
                Ok(_) => registered += 1,
                Err(e) if on_failure == OnWatchFailure::Skip => {
                    tracing::warn!("[registry] leaving directory unwatched: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(registered)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

fn is_reserved(entry: &DirEntry) -> bool {
    is_reserved_name(entry.file_name())
}

/// Names starting with `.` are never descended into.
fn is_reserved_name(name: &std::ffi::OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    /// Backend that records subscriptions and can be told to refuse some.
    #[derive(Debug, Default)]
    pub(crate) struct FakeBackend {
        pub watched: Vec<PathBuf>,
        pub refuse: HashSet<PathBuf>,
    }

    impl WatchBackend for FakeBackend {
        fn add_watch(&mut self, dir: &Path) -> Result<(), WatchError> {
            if self.refuse.contains(dir) {
                return Err(WatchError::PathWatchFailed {
                    path: dir.to_path_buf(),
                    reason: "refused by test".to_string(),
                });
            }
            self.watched.push(dir.to_path_buf());
            Ok(())
        }
    }

    fn root_at(path: &Path, id: u32) -> RootPath {
        RootPath {
            id: RootId::new(id),
            path: path.canonicalize().unwrap(),
        }
    }

    #[test]
    fn test_walk_registers_every_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::create_dir_all(temp.path().join("c")).unwrap();
        fs::write(temp.path().join("a/file.c"), "").unwrap();
        let root = root_at(temp.path(), 0);

        let mut registry = WatchRegistry::new(FakeBackend::default());
        let count = registry.walk(&root).unwrap();

        assert_eq!(count, 4);
        assert_eq!(registry.len(), 4);
        for dir in [
            root.path.clone(),
            root.path.join("a"),
            root.path.join("a/b"),
            root.path.join("c"),
        ] {
            let handle = registry.handle_for(&dir).expect("directory not registered");
            assert_eq!(registry.resolve(handle).unwrap().root, RootId::new(0));
        }
        assert!(registry.handle_for(&root.path.join("a/file.c")).is_none());
    }

    #[test]
    fn test_walk_skips_dot_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git/objects")).unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        let root = root_at(temp.path(), 0);

        let mut registry = WatchRegistry::new(FakeBackend::default());
        registry.walk(&root).unwrap();

        assert!(registry.handle_for(&root.path.join(".git")).is_none());
        assert!(registry.handle_for(&root.path.join(".git/objects")).is_none());
        assert!(registry.handle_for(&root.path.join("src")).is_some());
    }

    #[test]
    fn test_walk_of_file_root_registers_nothing() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("single.c");
        fs::write(&file, "").unwrap();
        let root = root_at(&file, 0);

        let mut registry = WatchRegistry::new(FakeBackend::default());
        assert_eq!(registry.walk(&root).unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_walk_failure_is_returned() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        let root = root_at(temp.path(), 0);

        let mut backend = FakeBackend::default();
        backend.refuse.insert(root.path.join("a"));
        let mut registry = WatchRegistry::new(backend);

        let err = registry.walk(&root).unwrap_err();
        assert!(matches!(err, WatchError::PathWatchFailed { .. }));
    }

    #[test]
    fn test_extend_skips_refused_directories() {
        let temp = TempDir::new().unwrap();
        let root = root_at(temp.path(), 2);
        let mut backend = FakeBackend::default();
        backend.refuse.insert(root.path.join("new/locked"));
        let mut registry = WatchRegistry::new(backend);
        registry.walk(&root).unwrap();

        fs::create_dir_all(root.path.join("new/locked")).unwrap();
        fs::create_dir_all(root.path.join("new/open")).unwrap();
        let added = registry.extend(&root.path.join("new"), RootId::new(2));

        assert_eq!(added, 2);
        assert!(registry.handle_for(&root.path.join("new/locked")).is_none());
        let handle = registry.handle_for(&root.path.join("new/open")).unwrap();
        assert_eq!(registry.resolve(handle).unwrap().root, RootId::new(2));
    }

    #[test]
    fn test_extend_ignores_dot_directory() {
        let temp = TempDir::new().unwrap();
        let root = root_at(temp.path(), 0);
        let mut registry = WatchRegistry::new(FakeBackend::default());
        registry.walk(&root).unwrap();

        fs::create_dir(root.path.join(".cache")).unwrap();
        assert_eq!(registry.extend(&root.path.join(".cache"), RootId::new(0)), 0);
    }

    #[test]
    fn test_extend_of_vanished_directory_is_harmless() {
        let temp = TempDir::new().unwrap();
        let root = root_at(temp.path(), 0);
        let mut registry = WatchRegistry::new(FakeBackend::default());
        registry.walk(&root).unwrap();

        assert_eq!(registry.extend(&root.path.join("gone"), RootId::new(0)), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_keeps_handle_and_resubscribes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().canonicalize().unwrap();
        let mut registry = WatchRegistry::new(FakeBackend::default());

        let first = registry.register(&dir, RootId::new(0)).unwrap();
        let second = registry.register(&dir, RootId::new(0)).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.backend().watched.len(), 2);
    }

    #[test]
    fn test_handles_are_distinct() {
        let mut registry = WatchRegistry::new(FakeBackend::default());
        let a = registry.register(Path::new("/x/a"), RootId::new(0)).unwrap();
        let b = registry.register(Path::new("/x/b"), RootId::new(0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.resolve(b).unwrap().path, PathBuf::from("/x/b"));
    }
}
