// src/fs/mock.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::FileSystem;

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    /// Listed, but opening it fails (permission denied).
    Unreadable,
    /// A directory with nothing in it yet.
    EmptyDir,
}

/// In-memory filesystem for tests.
///
/// Directories are implied by the files below them; `add_dir` is only
/// needed for empty ones. Paths are compared verbatim, so tests should
/// spell them the same way everywhere. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, Entry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create or overwrite a file.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.entries()
            .insert(path.as_ref().to_path_buf(), Entry::File(content.into()));
    }

    pub fn add_unreadable(&self, path: impl AsRef<Path>) {
        self.entries()
            .insert(path.as_ref().to_path_buf(), Entry::Unreadable);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.entries()
            .entry(path.as_ref().to_path_buf())
            .or_insert(Entry::EmptyDir);
    }

    /// Remove `path` and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.entries().retain(|p, _| !p.starts_with(path));
    }

    fn lookup(&self, path: &Path) -> Result<Vec<u8>> {
        match self.entries().get(path) {
            Some(Entry::File(bytes)) => Ok(bytes.clone()),
            Some(Entry::Unreadable) => Err(anyhow!("permission denied: {:?}", path)),
            Some(Entry::EmptyDir) => Err(anyhow!("is a directory: {:?}", path)),
            None if self.is_dir(path) => Err(anyhow!("is a directory: {:?}", path)),
            None => Err(anyhow!("no such file: {:?}", path)),
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        String::from_utf8(self.lookup(path)?)
            .map_err(|e| anyhow!("invalid UTF-8 in {:?}: {e}", path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.lookup(path)?)))
    }

    fn replace(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(
            self.entries().get(path),
            Some(Entry::File(_) | Entry::Unreadable)
        )
    }

    fn is_dir(&self, path: &Path) -> bool {
        let entries = self.entries();
        match entries.get(path) {
            Some(Entry::EmptyDir) => true,
            Some(_) => false,
            None => entries.keys().any(|p| p != path && p.starts_with(path)),
        }
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_dir(dir) {
            return Err(anyhow!("not a directory: {:?}", dir));
        }
        let children: BTreeSet<PathBuf> = self
            .entries()
            .keys()
            .filter_map(|p| p.strip_prefix(dir).ok())
            .filter_map(|rel| rel.components().next())
            .map(|first| dir.join(first))
            .collect();
        Ok(children.into_iter().collect())
    }
}
