// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize `Dockwatch.toml` without validating it.
///
/// `base_dir` is set to the file's directory so relative paths can be
/// resolved later. CLI overrides are applied to the raw form before
/// conversion with `ConfigFile::try_from`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let mut raw: RawConfigFile = toml::from_str(&text)?;
    raw.base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(PathBuf::new);
    Ok(raw)
}

pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}
