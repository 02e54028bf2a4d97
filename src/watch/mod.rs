// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Deciding which paths are tracked (extension set, exclude globs, dotfiles).
//! - Content hashing and the per-file hash store.
//! - Classifying each change as ignorable, restart-worthy or rebuild-worthy.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//!
//! It does **not** talk to the container engine; qualifying changes are
//! handed to the debouncer in [`crate::engine`].

pub mod classifier;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod scan;
pub mod store;
pub mod watcher;

pub use classifier::{
    ChangeClassifier, ChangeEvent, ChangeKind, Classification, ClassifiedChange,
};
pub use hash::{compute_content_hash, compute_file_hash, ContentHash};
pub use patterns::TrackedFilter;
pub use scan::{initial_scan, reconcile_store, scan_tracked_files, ScanReport};
pub use store::{
    shared, FileHashStore, HashStore, MemoryHashStore, SharedHashStore, StoredHashes,
    HASH_FILE_PATH,
};
pub use watcher::{change_events, process_change, spawn_watcher, WatcherHandle};
