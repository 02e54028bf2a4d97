// src/engine/debounce.rs

//! Trailing debounce of qualifying changes.
//!
//! [`DebounceWindow`] is the pure bookkeeping: it merges classifications and
//! hands out a generation number for every arm. [`DebounceScheduler`] wraps it
//! with a single tokio timer. A timer only delivers the pending trigger if its
//! generation is still current, so a timer that lost the race against a newer
//! event is inert even if the abort did not reach it in time.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{Action, Trigger};
use crate::watch::{Classification, ClassifiedChange};

/// Accumulated state of the current debounce window.
#[derive(Debug, Default)]
pub struct DebounceWindow {
    generation: u64,
    action: Option<Action>,
    paths: BTreeSet<String>,
    /// A special file asked for a rebuild.
    wants_confirmation: bool,
    /// A rebuild was requested by something that never asks (auxiliary file).
    forced_rebuild: bool,
}

impl DebounceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a classified change into the window.
    ///
    /// Returns the new generation to arm a timer for, or `None` if the change
    /// does not qualify (and the window is left untouched).
    pub fn record(&mut self, change: &ClassifiedChange) -> Option<u64> {
        let action = Action::from_classification(change.classification)?;

        self.action = self.action.max(Some(action));
        if !change.key.is_empty() {
            self.paths.insert(change.key.clone());
        }
        if change.classification == Classification::RebuildRequired {
            if change.needs_confirmation {
                self.wants_confirmation = true;
            } else {
                self.forced_rebuild = true;
            }
        }

        self.generation = self.generation.wrapping_add(1);
        Some(self.generation)
    }

    /// Take the pending trigger if `generation` is still the latest arm.
    pub fn take(&mut self, generation: u64) -> Option<Trigger> {
        if generation != self.generation {
            return None;
        }
        let action = self.action.take()?;
        let needs_confirmation =
            action == Action::Rebuild && self.wants_confirmation && !self.forced_rebuild;

        let trigger = Trigger {
            action,
            paths: std::mem::take(&mut self.paths),
            needs_confirmation,
        };
        self.wants_confirmation = false;
        self.forced_rebuild = false;
        Some(trigger)
    }

    /// Drop anything pending and invalidate outstanding generations.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.action = None;
        self.paths.clear();
        self.wants_confirmation = false;
        self.forced_rebuild = false;
    }

    pub fn is_pending(&self) -> bool {
        self.action.is_some()
    }
}

#[derive(Debug)]
struct SchedulerState {
    window: DebounceWindow,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
    delay: Duration,
    state: Mutex<SchedulerState>,
    trigger_tx: mpsc::UnboundedSender<Trigger>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        // The critical sections below never panic midway, so a poisoned
        // guard still holds consistent data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fire(&self, generation: u64) {
        let mut state = self.state();
        let Some(trigger) = state.window.take(generation) else {
            debug!(generation, "stale debounce timer fired; ignoring");
            return;
        };
        state.timer = None;

        debug!(
            action = %trigger.action,
            paths = ?trigger.paths,
            "debounce window closed; dispatching trigger"
        );
        if self.trigger_tx.send(trigger).is_err() {
            warn!("trigger channel closed; dropping debounced trigger");
        }
    }
}

/// Single-timer trailing debouncer.
///
/// Cloning yields another handle to the same window and timer.
#[derive(Debug, Clone)]
pub struct DebounceScheduler {
    inner: Arc<Inner>,
}

impl DebounceScheduler {
    /// Create a scheduler that emits triggers on `trigger_tx` once `delay`
    /// has passed without a new qualifying change.
    pub fn new(delay: Duration, trigger_tx: mpsc::UnboundedSender<Trigger>) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                state: Mutex::new(SchedulerState {
                    window: DebounceWindow::new(),
                    timer: None,
                }),
                trigger_tx,
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Record a classified change, re-arming the timer if it qualifies.
    ///
    /// Must be called from within a tokio runtime. Returns whether the timer
    /// was (re-)armed.
    pub fn record(&self, change: &ClassifiedChange) -> bool {
        let mut state = self.inner.state();
        let Some(generation) = state.window.record(change) else {
            return false;
        };

        if let Some(old) = state.timer.take() {
            old.abort();
        }

        let inner = Arc::clone(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.fire(generation);
        }));

        debug!(
            path = %change.key,
            classification = ?change.classification,
            generation,
            "debounce timer armed"
        );
        true
    }

    /// Disarm the timer and drop the pending trigger.
    pub fn cancel(&self) {
        let mut state = self.inner.state();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.window.is_pending() {
            debug!("debounce window cancelled with a pending trigger");
        }
        state.window.clear();
    }

    /// Whether a trigger is waiting for its quiet period to elapse.
    pub fn is_armed(&self) -> bool {
        self.inner.state().window.is_pending()
    }
}
