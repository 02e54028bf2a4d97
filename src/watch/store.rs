// src/watch/store.rs

//! Content-hash table per tracked path.
//!
//! The store maps a path key (relative to the watched root, `/`-separated;
//! absolute for auxiliary files outside the root) to the most recent
//! [`ContentHash`], plus the previous value for auditing.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::watch::hash::ContentHash;

/// Relative path (from the watch root) of the default hashes file.
pub const HASH_FILE_PATH: &str = ".dockwatch/hashes";

/// Current and previous hash recorded for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHashes {
    pub old: Option<ContentHash>,
    pub new: ContentHash,
}

/// Abstract storage for per-file hashes.
pub trait HashStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<ContentHash>>;

    /// Full record including the previous hash, if any.
    fn record(&self, key: &str) -> Result<Option<StoredHashes>>;

    /// Upsert `hash` as the newest value; the previous newest becomes `old`.
    fn set(&mut self, key: &str, hash: ContentHash) -> Result<()>;

    /// Upsert many hashes at once. Stores backed by a file write it once.
    fn set_many(&mut self, entries: Vec<(String, ContentHash)>) -> Result<()> {
        for (key, hash) in entries {
            self.set(&key, hash)?;
        }
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()>;

    /// All keys currently stored.
    fn keys(&self) -> Vec<String>;

    /// Remove records whose key is not in `active`. Returns how many were removed.
    fn prune(&mut self, active: &HashSet<String>) -> Result<usize>;
}

/// Store handle shared between the watcher and the coordinator.
pub type SharedHashStore = Arc<Mutex<Box<dyn HashStore>>>;

pub fn shared(store: impl HashStore + 'static) -> SharedHashStore {
    Arc::new(Mutex::new(Box::new(store)))
}

fn upsert(map: &mut BTreeMap<String, StoredHashes>, key: &str, hash: ContentHash) {
    let old = map.get(key).map(|r| r.new.clone());
    map.insert(key.to_string(), StoredHashes { old, new: hash });
}

/// Stores hashes in memory only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: BTreeMap<String, StoredHashes>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn get(&self, key: &str) -> Result<Option<ContentHash>> {
        Ok(self.map.get(key).map(|r| r.new.clone()))
    }

    fn record(&self, key: &str) -> Result<Option<StoredHashes>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, hash: ContentHash) -> Result<()> {
        debug!(key = %key, hash = %hash, "stored file hash (memory)");
        upsert(&mut self.map, key, hash);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }

    fn prune(&mut self, active: &HashSet<String>) -> Result<usize> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active.contains(k));
        let removed = initial_len - self.map.len();
        if removed > 0 {
            info!(removed, "pruned stale file hashes (memory)");
        }
        Ok(removed)
    }
}

/// Stores hashes in a file, mirrored in memory.
///
/// The file holds one record per line:
///
/// `<new-hash> <old-hash or '-'> <key>`
///
/// The key comes last so it may contain spaces. The whole table is rewritten
/// through a temporary file and a rename on every mutation; a scan's updates
/// go through [`HashStore::set_many`] and cost one rewrite.
#[derive(Debug)]
pub struct FileHashStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    map: BTreeMap<String, StoredHashes>,
}

impl FileHashStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty table. Malformed lines are skipped.
    pub fn open(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if fs.exists(&path) {
            let contents = fs
                .read_to_string(&path)
                .with_context(|| format!("loading hash file at {:?}", path))?;
            parse_table(&contents)
        } else {
            BTreeMap::new()
        };

        info!(path = ?path, records = map.len(), "opened hash store");
        Ok(Self { fs, path, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let mut out = String::new();
        for (key, rec) in self.map.iter() {
            let old = rec.old.as_ref().map(|h| h.as_str()).unwrap_or("-");
            let _ = writeln!(out, "{} {} {}", rec.new, old, key);
        }

        self.fs
            .replace(&self.path, out.as_bytes())
            .with_context(|| format!("writing hash file at {:?}", self.path))?;
        Ok(())
    }
}

fn parse_table(contents: &str) -> BTreeMap<String, StoredHashes> {
    let mut map = BTreeMap::new();

    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        let (Some(new), Some(old), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
            warn!(line = lineno + 1, "skipping malformed hash record");
            continue;
        };

        let new = match new.parse::<ContentHash>() {
            Ok(h) => h,
            Err(err) => {
                warn!(line = lineno + 1, error = %err, "skipping malformed hash record");
                continue;
            }
        };
        let old = if old == "-" { None } else { old.parse().ok() };

        map.insert(key.to_string(), StoredHashes { old, new });
    }

    map
}

impl HashStore for FileHashStore {
    fn get(&self, key: &str) -> Result<Option<ContentHash>> {
        Ok(self.map.get(key).map(|r| r.new.clone()))
    }

    fn record(&self, key: &str) -> Result<Option<StoredHashes>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, hash: ContentHash) -> Result<()> {
        debug!(key = %key, hash = %hash, "stored file hash (file)");
        upsert(&mut self.map, key, hash);
        self.persist()
    }

    fn set_many(&mut self, entries: Vec<(String, ContentHash)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        debug!(count = entries.len(), "stored file hashes (file)");
        for (key, hash) in entries {
            upsert(&mut self.map, &key, hash);
        }
        self.persist()
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        if self.map.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }

    fn prune(&mut self, active: &HashSet<String>) -> Result<usize> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active.contains(k));
        let removed = initial_len - self.map.len();

        if removed > 0 {
            self.persist()?;
            info!(removed, "pruned stale file hashes (file)");
        }
        Ok(removed)
    }
}
