// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::{ConfirmMode, HashStorageMode, LogRotation};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// root = "."
/// extensions = [".R"]
/// special_files = ["api.R"]
/// auxiliary_files = ["Dockerfile"]
/// debounce = "2s"
///
/// [service]
/// name = "akilimo-compute"
/// compose_file = "docker-compose.yml"
///
/// [rebuild]
/// confirm = "prompt"
/// prompt_timeout = "120s"
///
/// [logging]
/// file = ".dockwatch/dockwatch.log"
/// rotation = "daily"
/// max_files = 10
/// ```
///
/// Every section except `[service].name` has defaults. Relative paths are
/// resolved against `base_dir` (the directory holding the config file).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(skip)]
    pub base_dir: PathBuf,

    #[serde(default)]
    pub watch: RawWatchSection,

    #[serde(default)]
    pub service: RawServiceSection,

    #[serde(default)]
    pub hashes: RawHashesSection,

    #[serde(default)]
    pub rebuild: RawRebuildSection,

    #[serde(default)]
    pub logging: RawLoggingSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWatchSection {
    /// Directory watched recursively. Defaults to the config directory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Tracked file suffixes, e.g. `[".R"]`.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Basenames whose change requires a full rebuild.
    #[serde(default = "default_special_files")]
    pub special_files: Vec<String>,

    /// Extra files tracked outside the normal extension filter (the build
    /// descriptor). Any content change rebuilds.
    #[serde(default = "default_auxiliary_files")]
    pub auxiliary_files: Vec<PathBuf>,

    /// Globs (relative to root) that are never tracked.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Quiet period after the last change before acting, e.g. `"2s"`.
    #[serde(default = "default_debounce")]
    pub debounce: String,
}

fn default_extensions() -> Vec<String> {
    vec![".R".to_string()]
}

fn default_special_files() -> Vec<String> {
    vec!["api.R".to_string(), "api-wrapper-orig.R".to_string()]
}

fn default_auxiliary_files() -> Vec<PathBuf> {
    vec![PathBuf::from("Dockerfile")]
}

fn default_debounce() -> String {
    "2s".to_string()
}

impl Default for RawWatchSection {
    fn default() -> Self {
        Self {
            root: None,
            extensions: default_extensions(),
            special_files: default_special_files(),
            auxiliary_files: default_auxiliary_files(),
            exclude: Vec::new(),
            debounce: default_debounce(),
        }
    }
}

/// `[service]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServiceSection {
    /// Compose service name. Required (may be supplied via `--service`).
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    /// Tail container logs after a successful start/restart.
    #[serde(default = "default_true")]
    pub follow_logs: bool,

    /// Number of historical log lines shown when a tail session starts.
    #[serde(default = "default_log_tail")]
    pub log_tail: u32,

    /// Stop the service when dockwatch exits.
    #[serde(default)]
    pub stop_on_exit: bool,

    /// How long shutdown waits for an in-flight rebuild, e.g. `"30s"`.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: String,
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_tail() -> u32 {
    50
}

fn default_shutdown_grace() -> String {
    "30s".to_string()
}

impl Default for RawServiceSection {
    fn default() -> Self {
        Self {
            name: None,
            compose_file: default_compose_file(),
            docker_bin: default_docker_bin(),
            follow_logs: true,
            log_tail: default_log_tail(),
            stop_on_exit: false,
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// `[hashes]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHashesSection {
    #[serde(default)]
    pub storage: HashStorageMode,

    /// Hash table location. Defaults to `<root>/.dockwatch/hashes`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[rebuild]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRebuildSection {
    #[serde(default)]
    pub confirm: ConfirmMode,

    #[serde(default = "default_prompt_timeout")]
    pub prompt_timeout: String,
}

fn default_prompt_timeout() -> String {
    "120s".to_string()
}

impl Default for RawRebuildSection {
    fn default() -> Self {
        Self {
            confirm: ConfirmMode::default(),
            prompt_timeout: default_prompt_timeout(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLoggingSection {
    /// Also write logs to this file. Rotated files get a date suffix.
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files kept before the oldest is deleted.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

fn default_max_log_files() -> usize {
    10
}

impl Default for RawLoggingSection {
    fn default() -> Self {
        Self {
            file: None,
            rotation: LogRotation::default(),
            max_files: default_max_log_files(),
        }
    }
}

/// Validated configuration with resolved paths and parsed durations.
///
/// Construct through `ConfigFile::try_from(raw)` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSettings,
    pub service: ServiceSettings,
    pub hashes: HashSettings,
    pub rebuild: RebuildSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    pub special_files: Vec<String>,
    pub auxiliary_files: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub debounce: Duration,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub name: String,
    pub compose_file: PathBuf,
    pub docker_bin: String,
    pub follow_logs: bool,
    pub log_tail: u32,
    pub stop_on_exit: bool,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct HashSettings {
    pub storage: HashStorageMode,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RebuildSettings {
    pub confirm: ConfirmMode,
    pub prompt_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub file: Option<PathBuf>,
    pub rotation: LogRotation,
    pub max_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: None,
            rotation: LogRotation::default(),
            max_files: default_max_log_files(),
        }
    }
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        watch: WatchSettings,
        service: ServiceSettings,
        hashes: HashSettings,
        rebuild: RebuildSettings,
        logging: LoggingSettings,
    ) -> Self {
        Self {
            watch,
            service,
            hashes,
            rebuild,
            logging,
        }
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.watch.root
    }
}
