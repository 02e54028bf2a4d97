// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, trace, warn};

use crate::engine::debounce::DebounceScheduler;
use crate::watch::classifier::{ChangeClassifier, ChangeEvent, ChangeKind, Classification};

/// Keeps the OS watch registrations alive; watching stops on drop.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    dirs: Vec<PathBuf>,
}

impl WatcherHandle {
    /// Directories with an active watch, the project root first.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle").field("dirs", &self.dirs).finish_non_exhaustive()
    }
}

/// Map a notify event onto zero or more [`ChangeEvent`]s.
///
/// Renames arrive as `Modify(Name(_))`; every path involved is reported as
/// modified and its content hash decides (a vanished source path hashes as
/// missing and classifies as a deletion).
pub fn change_events(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| ChangeEvent::new(path.clone(), kind))
        .collect()
}

/// Classify one change and hand qualifying results to the debouncer.
///
/// Hashing happens on the blocking pool; the caller awaits it so changes are
/// classified in delivery order.
pub async fn process_change(
    classifier: Arc<ChangeClassifier>,
    debouncer: &DebounceScheduler,
    change: ChangeEvent,
) -> Classification {
    let path = change.path.clone();
    let classified = match tokio::task::spawn_blocking(move || classifier.observe(&change)).await
    {
        Ok(classified) => classified,
        Err(err) => {
            warn!(?path, error = %err, "classification task failed; ignoring change");
            return Classification::Ignore;
        }
    };

    if classified.classification.is_qualifying() {
        debouncer.record(&classified);
    }
    classified.classification
}

/// Watch the project root recursively, plus the directory of each auxiliary
/// file outside it (non-recursively), and feed every change through
/// [`process_change`] on a background task.
///
/// An auxiliary directory that cannot be watched is logged and skipped; a
/// failure on the root is an error.
pub fn spawn_watcher(
    classifier: Arc<ChangeClassifier>,
    debouncer: DebounceScheduler,
) -> Result<WatcherHandle> {
    let (tx, rx) = unbounded_channel::<Event>();

    // notify calls this on its own thread; tracing may not be reachable
    // from there during shutdown, so failures go straight to stderr.
    let on_event = move |res: notify::Result<Event>| {
        let sent = match res {
            Ok(event) => tx.send(event).map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(msg) = sent {
            eprintln!("dockwatch: file watch error: {msg}");
        }
    };
    let mut watcher = RecommendedWatcher::new(on_event, Config::default())
        .context("creating filesystem watcher")?;

    let root = classifier.root().to_path_buf();
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;
    info!(root = ?root, "watching project tree");

    let mut dirs = vec![root];
    for dir in outside_parents(&classifier) {
        if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(dir = ?dir, error = %err, "cannot watch auxiliary file directory");
            continue;
        }
        info!(dir = ?dir, "watching auxiliary file directory");
        dirs.push(dir);
    }

    tokio::spawn(forward_events(rx, classifier, debouncer));

    Ok(WatcherHandle {
        _watcher: watcher,
        dirs,
    })
}

async fn forward_events(
    mut rx: UnboundedReceiver<Event>,
    classifier: Arc<ChangeClassifier>,
    debouncer: DebounceScheduler,
) {
    while let Some(event) = rx.recv().await {
        trace!(?event, "notify event");
        for change in change_events(&event) {
            process_change(Arc::clone(&classifier), &debouncer, change).await;
        }
    }
    debug!("filesystem event stream closed");
}

/// Parent directories of auxiliary files that the recursive root watch
/// does not already cover.
fn outside_parents(classifier: &ChangeClassifier) -> BTreeSet<PathBuf> {
    let root = classifier.root();
    classifier
        .auxiliary_files()
        .iter()
        .filter(|aux| !aux.starts_with(root))
        .filter_map(|aux| aux.parent().map(|p| p.to_path_buf()))
        .collect()
}
