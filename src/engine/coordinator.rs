// src/engine/coordinator.rs

//! Executes debounced triggers against the container engine.
//!
//! Every action runs under the [`RebuildLock`]. A rebuild that finds another
//! rebuild holding the lock is dropped; one that finds a restart waits for it
//! to finish. A restart that finds the lock busy is dropped. The guard is
//! released on every exit path.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::engine::confirm::{ConfirmPolicy, Confirmer};
use crate::engine::lock::RebuildLock;
use crate::engine::log_stream::LogStreamGuard;
use crate::engine::{Action, Trigger};
use crate::errors::{DockwatchError, Result};
use crate::exec::ContainerEngine;
use crate::types::EngineOp;
use crate::watch::{reconcile_store, ChangeClassifier};

/// Where the coordinator currently is in an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Lock held, waiting for confirmation.
    Acquiring,
    Stopping,
    Building,
    Starting,
    Restarting,
}

/// Why a trigger did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A rebuild found another rebuild holding the lock.
    LockContention,
    /// A restart found another action holding the lock.
    RebuildInProgress,
    /// Confirmation was refused.
    Declined,
}

/// Result of executing one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed(Action),
    Failed { step: EngineOp, error: String },
    Skipped(SkipReason),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Completed(action) => write!(f, "{action} completed"),
            ActionOutcome::Failed { step, error } => write!(f, "failed at {step}: {error}"),
            ActionOutcome::Skipped(reason) => write!(f, "skipped ({reason:?})"),
        }
    }
}

/// Resets the phase to `Idle` when the action ends, however it ends.
struct PhaseReset<'a>(&'a Mutex<Phase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Phase::Idle;
    }
}

/// Serializes container actions for one service.
///
/// Cheap to clone; clones share the lock, phase and log stream.
#[derive(Clone)]
pub struct RebuildCoordinator {
    engine: Arc<dyn ContainerEngine>,
    service: String,
    lock: RebuildLock,
    phase: Arc<Mutex<Phase>>,
    policy: ConfirmPolicy,
    confirmer: Arc<dyn Confirmer>,
    classifier: Option<Arc<ChangeClassifier>>,
    log_stream: Option<LogStreamGuard>,
}

impl fmt::Debug for RebuildCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildCoordinator")
            .field("service", &self.service)
            .field("phase", &self.phase())
            .field("lock", &self.lock.state())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RebuildCoordinator {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        service: impl Into<String>,
        policy: ConfirmPolicy,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            engine,
            service: service.into(),
            lock: RebuildLock::new(),
            phase: Arc::new(Mutex::new(Phase::Idle)),
            policy,
            confirmer,
            classifier: None,
            log_stream: None,
        }
    }

    /// Re-scan through `classifier` after each successful action.
    pub fn with_reconcile(mut self, classifier: Arc<ChangeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Start a tail session through `log_stream` after each successful action.
    pub fn with_log_stream(mut self, log_stream: LogStreamGuard) -> Self {
        self.log_stream = Some(log_stream);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn lock(&self) -> &RebuildLock {
        &self.lock
    }

    pub fn log_stream(&self) -> Option<&LogStreamGuard> {
        self.log_stream.as_ref()
    }

    pub fn phase(&self) -> Phase {
        *self.phase_guard()
    }

    fn phase_guard(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        debug!(service = %self.service, ?phase, "coordinator phase");
        *self.phase_guard() = phase;
    }

    /// Run the action `trigger` asks for.
    pub async fn execute(&self, trigger: Trigger) -> ActionOutcome {
        info!(
            service = %self.service,
            action = %trigger.action,
            paths = ?trigger.paths,
            "executing trigger"
        );
        let outcome = match trigger.action {
            Action::Rebuild => self.rebuild(&trigger).await,
            Action::Restart => self.restart().await,
        };
        match &outcome {
            ActionOutcome::Completed(_) => info!(service = %self.service, "{outcome}"),
            ActionOutcome::Failed { .. } => error!(service = %self.service, "{outcome}"),
            ActionOutcome::Skipped(_) => debug!(service = %self.service, "{outcome}"),
        }
        outcome
    }

    async fn rebuild(&self, trigger: &Trigger) -> ActionOutcome {
        if self.lock.holder() == Some(Action::Restart) {
            info!(service = %self.service, "restart in progress; rebuild will follow it");
        }
        let Some(_guard) = self.lock.acquire_rebuild().await else {
            warn!(
                service = %self.service,
                paths = ?trigger.paths,
                "rebuild already in progress; dropping rebuild trigger"
            );
            return ActionOutcome::Skipped(SkipReason::LockContention);
        };
        let _reset = PhaseReset(&self.phase);
        self.set_phase(Phase::Acquiring);

        if trigger.needs_confirmation
            && !self.policy.decide(self.confirmer.as_ref(), trigger).await
        {
            return ActionOutcome::Skipped(SkipReason::Declined);
        }

        for (phase, op) in [
            (Phase::Stopping, EngineOp::Stop),
            (Phase::Building, EngineOp::Build),
            (Phase::Starting, EngineOp::Start),
        ] {
            self.set_phase(phase);
            if let Err(outcome) = self.run_step(op).await {
                return outcome;
            }
        }

        self.after_success().await;
        ActionOutcome::Completed(Action::Rebuild)
    }

    async fn restart(&self) -> ActionOutcome {
        let Some(_guard) = self.lock.try_acquire(Action::Restart) else {
            warn!(
                service = %self.service,
                "rebuild in progress; dropping restart trigger"
            );
            return ActionOutcome::Skipped(SkipReason::RebuildInProgress);
        };
        let _reset = PhaseReset(&self.phase);

        self.set_phase(Phase::Restarting);
        if let Err(outcome) = self.run_step(EngineOp::Restart).await {
            return outcome;
        }

        self.after_success().await;
        ActionOutcome::Completed(Action::Restart)
    }

    async fn run_step(&self, op: EngineOp) -> std::result::Result<(), ActionOutcome> {
        self.engine.run(op, &self.service).await.map_err(|err| {
            error!(
                service = %self.service,
                step = %op,
                error = %err,
                "container engine step failed"
            );
            ActionOutcome::Failed {
                step: op,
                error: err.to_string(),
            }
        })
    }

    async fn after_success(&self) {
        if let Some(classifier) = self.classifier.as_ref() {
            let classifier = Arc::clone(classifier);
            match tokio::task::spawn_blocking(move || reconcile_store(&classifier)).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(error = %err, "post-action re-scan failed"),
                Err(err) => warn!(error = %err, "post-action re-scan task failed"),
            }
        }

        if let Some(log_stream) = self.log_stream.as_ref() {
            log_stream.start();
        }
    }

    /// Stop the service outside the trigger path (shutdown).
    ///
    /// Fails with [`DockwatchError::LockContention`] if an action still holds
    /// the lock.
    pub async fn stop_service(&self) -> Result<()> {
        let Some(_guard) = self.lock.try_acquire(Action::Rebuild) else {
            return Err(DockwatchError::LockContention);
        };
        let _reset = PhaseReset(&self.phase);
        self.set_phase(Phase::Stopping);

        match self.engine.stop(&self.service).await {
            Ok(()) => {
                info!(service = %self.service, "service stopped");
                Ok(())
            }
            Err(err) => {
                error!(service = %self.service, error = %err, "failed to stop service");
                Err(err)
            }
        }
    }
}
