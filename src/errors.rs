// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::EngineOp;

#[derive(Error, Debug)]
pub enum DockwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A container engine operation reported failure (non-zero exit or
    /// could not be spawned at all).
    #[error("container engine `{op}` failed for service '{service}': {detail}")]
    EngineFailure {
        op: EngineOp,
        service: String,
        detail: String,
    },

    /// Another action held the rebuild lock.
    #[error("a rebuild is already in progress")]
    LockContention,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DockwatchError {
    pub fn engine(op: EngineOp, service: impl Into<String>, detail: impl Into<String>) -> Self {
        DockwatchError::EngineFailure {
            op,
            service: service.into(),
            detail: detail.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DockwatchError>;
