// src/engine/mod.rs

//! Orchestration engine for dockwatch.
//!
//! This module ties together:
//! - the debouncer that coalesces bursts of changes into one trigger
//! - the rebuild lock and the coordinator that drives the container engine
//! - the confirmation policy for rebuilds caused by special files
//! - the log-tail session guard
//! - the runtime event loop that reacts to triggers, finished actions and
//!   shutdown signals

use std::collections::BTreeSet;
use std::fmt;

use crate::watch::Classification;

/// What the coordinator is asked to do with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    /// Lightweight restart of the already-built container.
    Restart,
    /// Full stop → build → start sequence.
    Rebuild,
}

impl Action {
    /// Action for a qualifying classification, `None` for the rest.
    pub fn from_classification(c: Classification) -> Option<Self> {
        match c {
            Classification::Restart => Some(Action::Restart),
            Classification::RebuildRequired => Some(Action::Rebuild),
            Classification::Ignore | Classification::DeleteAck => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Restart => f.write_str("restart"),
            Action::Rebuild => f.write_str("rebuild"),
        }
    }
}

/// One debounced decision handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub action: Action,
    /// Store keys of every change that contributed.
    pub paths: BTreeSet<String>,
    /// A special file asked for the rebuild and nothing forced it.
    pub needs_confirmation: bool,
}

/// Events sent into the runtime from outside the trigger path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Graceful shutdown requested (Ctrl-C / SIGTERM).
    ShutdownRequested,
}

pub mod confirm;
pub mod coordinator;
pub mod debounce;
pub mod lock;
pub mod log_stream;
pub mod runtime;

pub use confirm::{ConfirmPolicy, Confirmer, PromptSlot, StdinConfirmer};
pub use coordinator::{ActionOutcome, Phase, RebuildCoordinator, SkipReason};
pub use debounce::{DebounceScheduler, DebounceWindow};
pub use lock::{LockState, RebuildGuard, RebuildLock};
pub use log_stream::LogStreamGuard;
pub use runtime::{Runtime, RuntimeOptions};
