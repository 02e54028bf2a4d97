// src/watch/classifier.rs

//! Turns raw change notifications into restart / rebuild decisions.
//!
//! The decision is always made against the hash recorded *before* the event;
//! the store is updated afterwards for every non-`Ignore` outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::fs::FileSystem;
use crate::watch::hash::{compute_content_hash, ContentHash};
use crate::watch::path_utils::{is_hidden, normalize, store_key};
use crate::watch::patterns::TrackedFilter;
use crate::watch::store::SharedHashStore;

/// Kind of filesystem change reported by the watch source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A single notification from the watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Outcome of classifying one change.
///
/// Ordered by priority: `Ignore < DeleteAck < Restart < RebuildRequired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    Ignore,
    DeleteAck,
    Restart,
    RebuildRequired,
}

impl Classification {
    /// Whether this outcome should reach the debouncer.
    pub fn is_qualifying(self) -> bool {
        matches!(self, Classification::Restart | Classification::RebuildRequired)
    }
}

/// Classification plus the context the debouncer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedChange {
    pub classification: Classification,
    /// Store key of the path (empty when the path was rejected outright).
    pub key: String,
    /// The rebuild came from a special file and may need confirmation.
    pub needs_confirmation: bool,
}

impl ClassifiedChange {
    fn ignore(key: impl Into<String>) -> Self {
        Self {
            classification: Classification::Ignore,
            key: key.into(),
            needs_confirmation: false,
        }
    }
}

/// What a path is, as far as tracking is concerned.
#[derive(Debug, Clone)]
enum Target {
    Auxiliary { key: String },
    Tracked { key: String, special: bool },
}

/// Classifies changes for one watched root.
pub struct ChangeClassifier {
    fs: Arc<dyn FileSystem>,
    filter: TrackedFilter,
    auxiliary: Vec<PathBuf>,
    store: SharedHashStore,
}

impl std::fmt::Debug for ChangeClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeClassifier")
            .field("filter", &self.filter)
            .field("auxiliary", &self.auxiliary)
            .finish_non_exhaustive()
    }
}

impl ChangeClassifier {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        filter: TrackedFilter,
        auxiliary: Vec<PathBuf>,
        store: SharedHashStore,
    ) -> Self {
        let root = filter.root().to_path_buf();
        let auxiliary = auxiliary.iter().map(|p| normalize(&root, p)).collect();
        Self {
            fs,
            filter,
            auxiliary,
            store,
        }
    }

    pub fn root(&self) -> &Path {
        self.filter.root()
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn filter(&self) -> &TrackedFilter {
        &self.filter
    }

    pub fn auxiliary_files(&self) -> &[PathBuf] {
        &self.auxiliary
    }

    pub fn store(&self) -> &SharedHashStore {
        &self.store
    }

    /// Hash the path (if it is tracked at all) and classify the event.
    ///
    /// Untracked paths are rejected before any file IO. A `Deleted` event
    /// for a path that exists again by the time it is hashed is treated as
    /// a modification of the recreated file.
    pub fn observe(&self, event: &ChangeEvent) -> ClassifiedChange {
        let path = normalize(self.root(), &event.path);
        let Some(target) = self.target(&path) else {
            return ClassifiedChange::ignore(String::new());
        };

        let hash = compute_content_hash(self.fs.as_ref(), &path);
        let kind = match (event.kind, &hash) {
            (ChangeKind::Deleted, ContentHash::Digest(_) | ContentHash::Error) => {
                ChangeKind::Modified
            }
            (kind, _) => kind,
        };

        self.decide(target, kind, hash)
    }

    /// Classify a change whose content hash has already been computed.
    ///
    /// `hash` is the fresh digest, or [`ContentHash::Missing`] if the file no
    /// longer exists, or [`ContentHash::Error`] if it could not be read.
    pub fn classify(&self, path: &Path, kind: ChangeKind, hash: ContentHash) -> ClassifiedChange {
        let path = normalize(self.root(), path);
        match self.target(&path) {
            Some(target) => self.decide(target, kind, hash),
            None => ClassifiedChange::ignore(String::new()),
        }
    }

    fn target(&self, path: &Path) -> Option<Target> {
        if is_hidden(path) || self.fs.is_dir(path) {
            return None;
        }

        if self.auxiliary.iter().any(|aux| aux == path) {
            return Some(Target::Auxiliary {
                key: store_key(self.root(), path),
            });
        }

        let key = self.filter.tracked_rel(path)?;
        Some(Target::Tracked {
            key,
            special: self.filter.is_special(path),
        })
    }

    fn decide(&self, target: Target, kind: ChangeKind, hash: ContentHash) -> ClassifiedChange {
        let deleted = kind == ChangeKind::Deleted || hash.is_missing();

        match target {
            Target::Auxiliary { key } => self.decide_auxiliary(key, deleted, hash),
            Target::Tracked { key, special } => self.decide_tracked(key, special, deleted, hash),
        }
    }

    fn decide_auxiliary(&self, key: String, deleted: bool, hash: ContentHash) -> ClassifiedChange {
        let previous = self.previous_hash(&key);

        if deleted {
            if previous.as_ref().is_some_and(ContentHash::is_missing) {
                return ClassifiedChange::ignore(key);
            }
            error!(
                file = %key,
                "build descriptor was deleted; the service cannot be rebuilt until it is restored"
            );
            self.update(&key, ContentHash::Missing);
            return ClassifiedChange {
                classification: Classification::DeleteAck,
                key,
                needs_confirmation: false,
            };
        }

        if !hash.is_error() && previous.as_ref() == Some(&hash) {
            debug!(file = %key, "build descriptor unchanged; ignoring");
            return ClassifiedChange::ignore(key);
        }

        info!(file = %key, "build descriptor changed; rebuild required");
        self.update(&key, hash);
        ClassifiedChange {
            classification: Classification::RebuildRequired,
            key,
            needs_confirmation: false,
        }
    }

    fn decide_tracked(
        &self,
        key: String,
        special: bool,
        deleted: bool,
        hash: ContentHash,
    ) -> ClassifiedChange {
        let previous = self.previous_hash(&key);

        if deleted {
            if previous.as_ref().is_some_and(ContentHash::is_missing) {
                debug!(path = %key, "duplicate delete notification; ignoring");
                return ClassifiedChange::ignore(key);
            }
            info!(path = %key, "file deleted");
            self.update(&key, ContentHash::Missing);
            return ClassifiedChange {
                classification: Classification::DeleteAck,
                key,
                needs_confirmation: false,
            };
        }

        // An unreadable file is always a change; comparing two ERROR
        // sentinels says nothing about the content.
        if !hash.is_error() && previous.as_ref() == Some(&hash) {
            debug!(path = %key, "hash unchanged; ignoring");
            return ClassifiedChange::ignore(key);
        }

        let classification = if special {
            info!(path = %key, "detected change in special file; rebuild required");
            Classification::RebuildRequired
        } else {
            info!(path = %key, "detected change; restart required");
            Classification::Restart
        };

        self.update(&key, hash);
        ClassifiedChange {
            classification,
            key,
            needs_confirmation: special,
        }
    }

    /// Stored hash for `key`; storage failures read as "unknown".
    fn previous_hash(&self, key: &str) -> Option<ContentHash> {
        let store = match self.store.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(path = %key, "hash store mutex poisoned; treating previous hash as unknown");
                return None;
            }
        };
        match store.get(key) {
            Ok(h) => h,
            Err(err) => {
                warn!(path = %key, error = %err, "failed to load stored hash; treating as unknown");
                None
            }
        }
    }

    fn update(&self, key: &str, hash: ContentHash) {
        let mut store = match self.store.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(path = %key, "hash store mutex poisoned; hash not recorded");
                return;
            }
        };
        if let Err(err) = store.set(key, hash) {
            warn!(path = %key, error = %err, "failed to save file hash");
        }
    }
}
