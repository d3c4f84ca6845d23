// src/fs/mock.rs

use super::FileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<PathBuf, MockEntry>,
    writes: usize,
    /// Once `writes` reaches this number every further write fails.
    fail_after_writes: Option<usize>,
    fail_create_dir: BTreeSet<PathBuf>,
}

/// In-memory filesystem with failure injection.
///
/// Clones share the same state, so a test can keep one handle for
/// inspection while the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned mock only happens after a test already panicked.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a file (and its ancestors) directly, bypassing failure injection.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            insert_dirs(&mut state.entries, parent);
        }
        state.entries.insert(path, MockEntry::File(content.into()));
    }

    /// Make every write after the first `n` successful ones fail.
    pub fn fail_after_writes(&self, n: usize) {
        let mut state = self.lock();
        state.fail_after_writes = Some(state.writes + n);
    }

    /// Make `create_dir_all` fail for exactly this path.
    pub fn fail_create_dir(&self, path: impl AsRef<Path>) {
        self.lock()
            .fail_create_dir
            .insert(path.as_ref().to_path_buf());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_after_writes = None;
        state.fail_create_dir.clear();
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().entries.get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// All file paths below `dir`, sorted.
    pub fn files_under(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.lock()
            .entries
            .iter()
            .filter(|(path, entry)| {
                matches!(entry, MockEntry::File(_)) && path.starts_with(dir)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn insert_dirs(entries: &mut BTreeMap<PathBuf, MockEntry>, dir: &Path) {
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        entries
            .entry(ancestor.to_path_buf())
            .or_insert(MockEntry::Dir);
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("not found: {path:?}"))
}

impl FileSystem for MockFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_create_dir.contains(path) {
            return Err(io::Error::other(format!("injected mkdir failure: {path:?}")));
        }
        if let Some(file) = path
            .ancestors()
            .find(|a| matches!(state.entries.get(*a), Some(MockEntry::File(_))))
        {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {file:?}"),
            ));
        }
        insert_dirs(&mut state.entries, path);
        Ok(())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if let Some(limit) = state.fail_after_writes {
            if state.writes >= limit {
                return Err(io::Error::other(format!("injected write failure: {path:?}")));
            }
        }
        let parent_ok = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                matches!(state.entries.get(parent), Some(MockEntry::Dir))
            }
            _ => true,
        };
        if !parent_ok {
            return Err(not_found(path));
        }
        state
            .entries
            .insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        state.writes += 1;
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.lock().entries.get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir) => Err(io::Error::other(format!("is a directory: {path:?}"))),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry::Dir) => Ok(state
                .entries
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            _ => Err(not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry::Dir) => {
                state.entries.retain(|p, _| !p.starts_with(path));
                Ok(())
            }
            _ => Err(not_found(path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(path), Some(MockEntry::File(_)))
    }
}
