// src/config/mod.rs

//! Configuration loading and validation for dockwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and resolve it into an immutable `ConfigFile` (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, HashSettings, LoggingSettings, RawConfigFile, RawHashesSection,
    RawLoggingSection, RawRebuildSection, RawServiceSection, RawWatchSection, RebuildSettings,
    ServiceSettings, WatchSettings,
};
pub use validate::parse_duration;
