// src/watch/path_utils.rs

//! Path keys and lexical path helpers shared by the classifier and scans.

use std::path::{Component, Path, PathBuf};

/// `path` relative to `root` as a `/`-separated string, or `None` when it
/// lies outside the root.
///
/// Plain prefix stripping is tried first; canonical forms are compared only
/// when that fails.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slashed(rel));
    }

    // Different absolute prefixes may name the same directory (symlinks,
    // /private/var on macOS). Deleted files cannot be canonicalized, so
    // fall back to canonicalizing only the parent directory.
    let root_canon = root.canonicalize().ok()?;
    if let Ok(path_canon) = path.canonicalize() {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(slashed(rel));
        }
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent_canon) = parent.canonicalize() {
            if let Ok(rel) = parent_canon.join(name).strip_prefix(&root_canon) {
                return Some(slashed(rel));
            }
        }
    }

    None
}

/// Key under which a path is recorded in the hash store.
///
/// Paths under `root` are keyed relative to it; anything else (auxiliary
/// files living outside the tree) is keyed by its absolute path.
pub fn store_key(root: &Path, path: &Path) -> String {
    relative_str(root, path).unwrap_or_else(|| slashed(path))
}

/// Make `path` absolute against `root` and fold `.` / `..` components
/// lexically. The file does not need to exist.
pub fn normalize(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if the final component of `path` starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Final component of `path` as a string, if it has one.
pub fn file_name_str(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
