#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dockwatch::config::{ConfigFile, RawConfigFile};
use dockwatch::fs::mock::MockFileSystem;
use dockwatch::fs::FileSystem;
use dockwatch::types::{ConfirmMode, HashStorageMode};
use dockwatch::watch::{shared, ChangeClassifier, MemoryHashStore, SharedHashStore, TrackedFilter};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the file defaults with service `api` and in-memory hashes,
/// rooted at `root`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut config = RawConfigFile::default();
        config.base_dir = root.into();
        config.service.name = Some("api".to_string());
        config.hashes.storage = HashStorageMode::Memory;
        Self { config }
    }

    pub fn service(mut self, name: &str) -> Self {
        self.config.service.name = Some(name.to_string());
        self
    }

    pub fn extensions(mut self, exts: &[&str]) -> Self {
        self.config.watch.extensions = exts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn special_files(mut self, names: &[&str]) -> Self {
        self.config.watch.special_files = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn auxiliary_files(mut self, paths: &[&str]) -> Self {
        self.config.watch.auxiliary_files = paths.iter().map(PathBuf::from).collect();
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn debounce(mut self, duration: &str) -> Self {
        self.config.watch.debounce = duration.to_string();
        self
    }

    pub fn confirm(mut self, mode: ConfirmMode) -> Self {
        self.config.rebuild.confirm = mode;
        self
    }

    pub fn file_store(mut self) -> Self {
        self.config.hashes.storage = HashStorageMode::File;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Classifier over a mock filesystem with an in-memory store.
pub fn mock_classifier(
    fs: &MockFileSystem,
    cfg: &ConfigFile,
) -> (Arc<ChangeClassifier>, SharedHashStore) {
    let store = shared(MemoryHashStore::new());
    let classifier = classifier_with_store(Arc::new(fs.clone()), cfg, store.clone());
    (classifier, store)
}

/// Classifier over any filesystem and store.
pub fn classifier_with_store(
    fs: Arc<dyn FileSystem>,
    cfg: &ConfigFile,
    store: SharedHashStore,
) -> Arc<ChangeClassifier> {
    let filter = TrackedFilter::from_config(cfg).expect("valid tracked filter");
    Arc::new(ChangeClassifier::new(
        fs,
        filter,
        cfg.watch.auxiliary_files.clone(),
        store,
    ))
}

/// `root.join(rel)` spelled the way the mock filesystem stores it.
pub fn at(root: &Path, rel: &str) -> PathBuf {
    root.join(rel)
}
