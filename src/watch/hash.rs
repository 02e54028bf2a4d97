// src/watch/hash.rs

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, error};

use crate::fs::FileSystem;

/// Sentinel stored for a tracked file that no longer exists.
pub const MISSING: &str = "MISSING";
/// Sentinel stored for a tracked file that exists but could not be read.
pub const ERROR: &str = "ERROR";

/// Last known content state of a tracked file.
///
/// The textual form (used by the persistent store) is the lower-case hex
/// blake3 digest, or one of the [`MISSING`] / [`ERROR`] sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentHash {
    Digest(String),
    Missing,
    Error,
}

impl ContentHash {
    pub fn is_missing(&self) -> bool {
        matches!(self, ContentHash::Missing)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ContentHash::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentHash::Digest(d) => d,
            ContentHash::Missing => MISSING,
            ContentHash::Error => ERROR,
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            MISSING => Ok(ContentHash::Missing),
            ERROR => Ok(ContentHash::Error),
            "" => Err("empty hash value".to_string()),
            d if d.chars().all(|c| c.is_ascii_hexdigit()) => {
                Ok(ContentHash::Digest(d.to_ascii_lowercase()))
            }
            other => Err(format!("invalid hash value: {other}")),
        }
    }
}

/// Compute the blake3 digest of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute the content state of `path`, folding failures into sentinels.
///
/// - file absent → [`ContentHash::Missing`]
/// - file present but unreadable → [`ContentHash::Error`] (logged)
pub fn compute_content_hash(fs: &dyn FileSystem, path: &Path) -> ContentHash {
    if !fs.exists(path) {
        return ContentHash::Missing;
    }

    match compute_file_hash(fs, path) {
        Ok(digest) => {
            debug!(?path, hash = %digest, "computed content hash");
            ContentHash::Digest(digest)
        }
        Err(err) => {
            // The file may have been removed between the existence check and
            // the read; prefer the deletion reading in that case.
            if !fs.exists(path) {
                return ContentHash::Missing;
            }
            error!(?path, error = %err, "failed to hash file");
            ContentHash::Error
        }
    }
}
