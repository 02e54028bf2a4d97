// src/watch/scan.rs

//! Full-tree scans that seed and reconcile the hash store.
//!
//! Scans never produce triggers. At startup they record files that changed
//! while dockwatch was not running; after a successful rebuild or restart they
//! absorb any drift that happened while the engine was busy.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::watch::classifier::ChangeClassifier;
use crate::watch::hash::{compute_content_hash, ContentHash};
use crate::watch::path_utils::{is_hidden, store_key};
use crate::watch::patterns::TrackedFilter;

/// Summary of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Number of files hashed (tracked files plus present auxiliary files).
    pub scanned: usize,
    /// Keys seen for the first time.
    pub added: Vec<String>,
    /// Keys whose hash differed from the stored one.
    pub changed: Vec<String>,
    /// Records dropped because the file no longer exists.
    pub pruned: usize,
}

/// Recursively collect every tracked file under the filter's root.
///
/// Hidden directories (`.git`, `.dockwatch`, ...) are not descended into.
/// Unreadable subdirectories are logged and skipped; failure to read the
/// root itself is an error.
pub fn scan_tracked_files(fs: &dyn FileSystem, filter: &TrackedFilter) -> Result<Vec<PathBuf>> {
    let root = filter.root();
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs.list_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if dir == root => {
                return Err(err).with_context(|| format!("scanning watch root {:?}", root));
            }
            Err(err) => {
                warn!(dir = ?dir, error = %err, "skipping unreadable directory");
                continue;
            }
        };

        for path in entries {
            if is_hidden(&path) {
                continue;
            }
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) && filter.tracked_rel(&path).is_some() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Seed the store at startup.
///
/// Files whose content differs from the persisted hash are logged as having
/// changed while dockwatch was down; no action is taken for them.
pub fn initial_scan(classifier: &ChangeClassifier) -> Result<ScanReport> {
    let report = sync_store(classifier)?;

    for key in report.changed.iter() {
        info!(path = %key, "file changed while dockwatch was not running");
    }
    info!(
        scanned = report.scanned,
        added = report.added.len(),
        changed = report.changed.len(),
        pruned = report.pruned,
        "initial scan complete"
    );
    Ok(report)
}

/// Re-scan the tree after a successful action and bring the store in line.
pub fn reconcile_store(classifier: &ChangeClassifier) -> Result<ScanReport> {
    let report = sync_store(classifier)?;

    if !report.changed.is_empty() || !report.added.is_empty() {
        debug!(
            changed = ?report.changed,
            added = ?report.added,
            "reconciled hash drift after action"
        );
    }
    Ok(report)
}

fn sync_store(classifier: &ChangeClassifier) -> Result<ScanReport> {
    let fs = classifier.fs();
    let root = classifier.root();

    let mut targets = scan_tracked_files(fs.as_ref(), classifier.filter())?;
    targets.extend(
        classifier
            .auxiliary_files()
            .iter()
            .filter(|p| fs.is_file(p))
            .cloned(),
    );
    targets.sort();
    targets.dedup();

    let fresh: Vec<(String, ContentHash)> = targets
        .iter()
        .map(|path| (store_key(root, path), compute_content_hash(fs.as_ref(), path)))
        .collect();

    let mut store = classifier
        .store()
        .lock()
        .map_err(|_| anyhow::anyhow!("hash store mutex poisoned"))?;

    let mut report = ScanReport {
        scanned: fresh.len(),
        ..ScanReport::default()
    };
    let mut active = HashSet::with_capacity(fresh.len());
    let mut updates = Vec::new();

    for (key, hash) in fresh {
        active.insert(key.clone());

        let previous = match store.get(&key) {
            Ok(prev) => prev,
            Err(err) => {
                warn!(path = %key, error = %err, "failed to load stored hash during scan");
                None
            }
        };

        match previous {
            Some(ref prev) if *prev == hash && !hash.is_error() => continue,
            Some(_) => report.changed.push(key.clone()),
            None => report.added.push(key.clone()),
        }

        updates.push((key, hash));
    }

    let updated = updates.len();
    if let Err(err) = store.set_many(updates) {
        warn!(count = updated, error = %err, "failed to save file hashes during scan");
    }

    report.pruned = store.prune(&active)?;
    Ok(report)
}
