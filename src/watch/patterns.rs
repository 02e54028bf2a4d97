// src/watch/patterns.rs

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::ConfigFile;
use crate::watch::path_utils::{file_name_str, is_hidden, relative_str};

/// Decides which paths under the watched root are tracked at all.
///
/// A path is tracked when it lies under `root`, no component of its
/// root-relative path starts with a dot, it ends with one of the configured
/// extensions and it is not matched by an exclude glob (evaluated against the
/// root-relative path).
#[derive(Clone)]
pub struct TrackedFilter {
    root: PathBuf,
    extensions: Vec<String>,
    exclude_set: Option<GlobSet>,
    special_files: HashSet<String>,
}

impl fmt::Debug for TrackedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedFilter")
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .field("special_files", &self.special_files)
            .finish_non_exhaustive()
    }
}

impl TrackedFilter {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: Vec<String>,
        exclude: &[String],
        special_files: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            root: root.into(),
            extensions,
            exclude_set,
            special_files: special_files.into_iter().collect(),
        })
    }

    /// Build the filter from a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::new(
            cfg.root().to_path_buf(),
            cfg.watch.extensions.clone(),
            &cfg.watch.exclude,
            cfg.watch.special_files.iter().cloned(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path of `path` if it is tracked, `None` otherwise.
    pub fn tracked_rel(&self, path: &Path) -> Option<String> {
        if is_hidden(path) {
            return None;
        }
        let rel = relative_str(&self.root, path)?;
        if rel.is_empty() || rel.split('/').any(|c| c.starts_with('.')) {
            return None;
        }
        if !self.matches_rel(&rel) {
            return None;
        }
        Some(rel)
    }

    /// Extension + exclude check on a root-relative path.
    pub fn matches_rel(&self, rel_path: &str) -> bool {
        if !self.extensions.iter().any(|ext| rel_path.ends_with(ext.as_str())) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }

    /// Whether the basename of `path` is in the special-file set.
    pub fn is_special(&self, path: &Path) -> bool {
        file_name_str(path)
            .map(|name| self.special_files.contains(&name))
            .unwrap_or(false)
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
