// src/config/validate.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    ConfigFile, HashSettings, LoggingSettings, RawConfigFile, RebuildSettings, ServiceSettings,
    WatchSettings,
};
use crate::errors::{DockwatchError, Result};
use crate::watch::path_utils::normalize;
use crate::watch::patterns::build_globset;
use crate::watch::store::HASH_FILE_PATH;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DockwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let base = absolute_base(&raw.base_dir);

        let watch = validate_watch(&raw, &base)?;
        let service = validate_service(&raw, &base)?;
        let hashes = HashSettings {
            storage: raw.hashes.storage,
            path: match raw.hashes.path {
                Some(ref p) => normalize(&base, p),
                None => watch.root.join(HASH_FILE_PATH),
            },
        };
        let rebuild = RebuildSettings {
            confirm: raw.rebuild.confirm,
            prompt_timeout: parse_nonzero("[rebuild].prompt_timeout", &raw.rebuild.prompt_timeout)?,
        };
        if raw.logging.max_files == 0 {
            return Err(DockwatchError::ConfigError(
                "[logging].max_files must be at least 1".to_string(),
            ));
        }
        let logging = LoggingSettings {
            file: raw.logging.file.as_ref().map(|p| normalize(&base, p)),
            rotation: raw.logging.rotation,
            max_files: raw.logging.max_files,
        };

        Ok(ConfigFile::new_unchecked(watch, service, hashes, rebuild, logging))
    }
}

/// Make the config base directory absolute; an empty base means the
/// current working directory.
fn absolute_base(base_dir: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if base_dir.as_os_str().is_empty() {
        cwd
    } else {
        normalize(&cwd, base_dir)
    }
}

fn validate_watch(raw: &RawConfigFile, base: &Path) -> Result<WatchSettings> {
    let w = &raw.watch;

    if w.extensions.is_empty() {
        return Err(DockwatchError::ConfigError(
            "[watch].extensions must list at least one extension".to_string(),
        ));
    }
    for ext in w.extensions.iter() {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(DockwatchError::ConfigError(format!(
                "[watch].extensions entry '{}' must look like \".ext\"",
                ext
            )));
        }
    }

    for name in w.special_files.iter() {
        if name.contains('/') || name.contains('\\') {
            return Err(DockwatchError::ConfigError(format!(
                "[watch].special_files entry '{}' must be a bare file name",
                name
            )));
        }
    }

    build_globset(&w.exclude)
        .map_err(|e| DockwatchError::ConfigError(format!("[watch].exclude: {e:#}")))?;

    let root = match w.root {
        Some(ref r) => normalize(base, r),
        None => base.to_path_buf(),
    };

    Ok(WatchSettings {
        auxiliary_files: w.auxiliary_files.iter().map(|p| normalize(base, p)).collect(),
        root,
        extensions: w.extensions.clone(),
        special_files: w.special_files.clone(),
        exclude: w.exclude.clone(),
        debounce: parse_nonzero("[watch].debounce", &w.debounce)?,
    })
}

fn validate_service(raw: &RawConfigFile, base: &Path) -> Result<ServiceSettings> {
    let s = &raw.service;

    let name = match s.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => {
            return Err(DockwatchError::ConfigError(
                "[service].name is required (or pass --service)".to_string(),
            ));
        }
    };

    if s.docker_bin.trim().is_empty() {
        return Err(DockwatchError::ConfigError(
            "[service].docker_bin must not be empty".to_string(),
        ));
    }

    let shutdown_grace = parse_duration(&s.shutdown_grace).map_err(|e| {
        DockwatchError::ConfigError(format!("[service].shutdown_grace: {e}"))
    })?;

    Ok(ServiceSettings {
        name,
        compose_file: normalize(base, &s.compose_file),
        docker_bin: s.docker_bin.clone(),
        follow_logs: s.follow_logs,
        log_tail: s.log_tail,
        stop_on_exit: s.stop_on_exit,
        shutdown_grace,
    })
}

fn parse_nonzero(field: &str, s: &str) -> Result<Duration> {
    let d = parse_duration(s).map_err(|e| DockwatchError::ConfigError(format!("{field}: {e}")))?;
    if d.is_zero() {
        return Err(DockwatchError::ConfigError(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(d)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
