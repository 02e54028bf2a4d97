// tests/coordinator.rs

mod common;
use crate::common::builders::{mock_classifier, ConfigFileBuilder};
use crate::common::{init_tracing, with_timeout, FakeEngine, TestResult, ROOT};

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

use dockwatch::engine::{
    Action, ActionOutcome, ConfirmPolicy, Confirmer, LockState, LogStreamGuard, Phase,
    PromptSlot, RebuildCoordinator, SkipReason, Trigger,
};
use dockwatch::exec::ContainerEngine;
use dockwatch::errors::DockwatchError;
use dockwatch::fs::mock::MockFileSystem;
use dockwatch::types::{ConfirmMode, EngineOp};
use dockwatch::watch::HashStore;

fn trigger(action: Action, needs_confirmation: bool) -> Trigger {
    Trigger {
        action,
        paths: BTreeSet::from(["api.R".to_string()]),
        needs_confirmation,
    }
}

#[derive(Clone, Copy)]
enum Reply {
    Answer(bool),
    Hang,
    Fail,
}

/// Confirmer that replies from a script and counts how often it was asked.
struct Scripted {
    reply: Reply,
    asked: AtomicUsize,
}

impl Scripted {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            asked: AtomicUsize::new(0),
        })
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

type Asked<'a> = Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'a>>;

impl Confirmer for Scripted {
    fn ask(&self, _question: &str) -> Asked<'_> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply;
        Box::pin(async move {
            match reply {
                Reply::Answer(yes) => Ok(yes),
                Reply::Hang => std::future::pending().await,
                Reply::Fail => Err(anyhow!("stdin is not a terminal")),
            }
        })
    }
}

fn coordinator(engine: &FakeEngine) -> RebuildCoordinator {
    RebuildCoordinator::new(
        Arc::new(engine.clone()),
        "api",
        ConfirmPolicy::AlwaysRebuild,
        Scripted::new(Reply::Answer(true)),
    )
}

fn with_policy(
    engine: &FakeEngine,
    policy: ConfirmPolicy,
    confirmer: Arc<Scripted>,
) -> RebuildCoordinator {
    RebuildCoordinator::new(Arc::new(engine.clone()), "api", policy, confirmer)
}

#[tokio::test(start_paused = true)]
async fn rebuild_runs_stop_build_start() {
    init_tracing();
    let engine = FakeEngine::new();
    let coord = coordinator(&engine);

    let outcome = coord.execute(trigger(Action::Rebuild, false)).await;
    assert_eq!(outcome, ActionOutcome::Completed(Action::Rebuild));
    assert_eq!(
        engine.calls(),
        vec![EngineOp::Stop, EngineOp::Build, EngineOp::Start]
    );
    assert_eq!(coord.lock().state(), LockState::Idle);
    assert_eq!(coord.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn restart_only_restarts() {
    let engine = FakeEngine::new();
    let coord = coordinator(&engine);

    let outcome = coord.execute(trigger(Action::Restart, false)).await;
    assert_eq!(outcome, ActionOutcome::Completed(Action::Restart));
    assert_eq!(engine.calls(), vec![EngineOp::Restart]);
}

#[tokio::test(start_paused = true)]
async fn failed_step_stops_the_sequence() {
    init_tracing();
    let engine = FakeEngine::new();
    engine.fail_next(EngineOp::Build);
    let coord = coordinator(&engine);

    let outcome = coord.execute(trigger(Action::Rebuild, false)).await;
    match outcome {
        ActionOutcome::Failed { step, error } => {
            assert_eq!(step, EngineOp::Build);
            assert!(error.contains("scripted failure"), "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(engine.calls(), vec![EngineOp::Stop, EngineOp::Build]);
    assert!(!coord.lock().is_held());

    // A stop failure never reaches build.
    engine.fail_next(EngineOp::Stop);
    let outcome = coord.execute(trigger(Action::Rebuild, false)).await;
    assert!(matches!(
        outcome,
        ActionOutcome::Failed {
            step: EngineOp::Stop,
            ..
        }
    ));
    assert_eq!(engine.count(EngineOp::Build), 1);
}

#[tokio::test(start_paused = true)]
async fn broken_build_is_not_retried() {
    let engine = FakeEngine::new();
    engine.set_failing(EngineOp::Build, true);
    let coord = coordinator(&engine);

    for _ in 0..3 {
        let outcome = coord.execute(trigger(Action::Rebuild, false)).await;
        assert!(matches!(
            outcome,
            ActionOutcome::Failed {
                step: EngineOp::Build,
                ..
            }
        ));
    }
    assert_eq!(engine.count(EngineOp::Build), 3);
    assert_eq!(engine.count(EngineOp::Start), 0);

    engine.set_failing(EngineOp::Build, false);
    let outcome = coord.execute(trigger(Action::Rebuild, false)).await;
    assert_eq!(outcome, ActionOutcome::Completed(Action::Rebuild));
    assert_eq!(engine.count(EngineOp::Start), 1);
}

#[tokio::test(start_paused = true)]
async fn lock_is_released_after_every_outcome() {
    let engine = FakeEngine::new();
    let coord = coordinator(&engine);

    for i in 0..100 {
        let action = if i % 2 == 0 { Action::Rebuild } else { Action::Restart };
        match i % 5 {
            0 => engine.fail_next(EngineOp::Stop),
            1 => engine.fail_next(EngineOp::Restart),
            2 => engine.fail_next(EngineOp::Start),
            _ => {}
        }

        coord.execute(trigger(action, false)).await;
        assert!(!coord.lock().is_held(), "lock held after run {i}");
        assert_eq!(coord.phase(), Phase::Idle);
    }
}

#[tokio::test(start_paused = true)]
async fn busy_lock_drops_new_triggers() {
    init_tracing();
    let engine = FakeEngine::new();
    engine.hold(EngineOp::Build);
    let coord = coordinator(&engine);

    let running = tokio::spawn({
        let coord = coord.clone();
        async move { coord.execute(trigger(Action::Rebuild, false)).await }
    });
    with_timeout(engine.wait_for(EngineOp::Build, 1)).await;

    assert_eq!(coord.phase(), Phase::Building);
    assert_eq!(coord.lock().state(), LockState::InProgress);

    assert_eq!(
        coord.execute(trigger(Action::Rebuild, false)).await,
        ActionOutcome::Skipped(SkipReason::LockContention)
    );
    assert_eq!(
        coord.execute(trigger(Action::Restart, false)).await,
        ActionOutcome::Skipped(SkipReason::RebuildInProgress)
    );

    engine.release(EngineOp::Build);
    let outcome = with_timeout(running).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Completed(Action::Rebuild));

    // Dropped triggers are not replayed later.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(
        engine.calls(),
        vec![EngineOp::Stop, EngineOp::Build, EngineOp::Start]
    );
}

#[tokio::test(start_paused = true)]
async fn declined_confirmation_skips_rebuild() {
    let engine = FakeEngine::new();
    let confirmer = Scripted::new(Reply::Answer(false));
    let coord = with_policy(
        &engine,
        ConfirmPolicy::PromptWithTimeout(Duration::from_secs(10)),
        confirmer.clone(),
    );

    let outcome = coord.execute(trigger(Action::Rebuild, true)).await;
    assert_eq!(outcome, ActionOutcome::Skipped(SkipReason::Declined));
    assert_eq!(confirmer.asked(), 1);
    assert!(engine.calls().is_empty());
    assert!(!coord.lock().is_held());
}

#[tokio::test(start_paused = true)]
async fn yes_error_and_timeout_all_rebuild() {
    init_tracing();
    for reply in [Reply::Answer(true), Reply::Fail, Reply::Hang] {
        let engine = FakeEngine::new();
        let coord = with_policy(
            &engine,
            ConfirmPolicy::PromptWithTimeout(Duration::from_secs(2)),
            Scripted::new(reply),
        );

        let outcome = with_timeout(coord.execute(trigger(Action::Rebuild, true))).await;
        assert_eq!(outcome, ActionOutcome::Completed(Action::Rebuild));
        assert_eq!(engine.count(EngineOp::Build), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn never_policy_skips_only_rebuilds_that_ask() {
    let engine = FakeEngine::new();
    let confirmer = Scripted::new(Reply::Answer(true));
    let coord = with_policy(&engine, ConfirmPolicy::AlwaysSkip, confirmer.clone());

    assert_eq!(
        coord.execute(trigger(Action::Rebuild, true)).await,
        ActionOutcome::Skipped(SkipReason::Declined)
    );
    assert_eq!(
        coord.execute(trigger(Action::Rebuild, false)).await,
        ActionOutcome::Completed(Action::Rebuild)
    );
    assert_eq!(confirmer.asked(), 0);
}

#[tokio::test(start_paused = true)]
async fn confirmation_happens_while_holding_the_lock() {
    let engine = FakeEngine::new();
    let coord = with_policy(
        &engine,
        ConfirmPolicy::PromptWithTimeout(Duration::from_secs(3)),
        Scripted::new(Reply::Hang),
    );

    let waiting = tokio::spawn({
        let coord = coord.clone();
        async move { coord.execute(trigger(Action::Rebuild, true)).await }
    });
    sleep(Duration::from_secs(1)).await;

    assert_eq!(coord.phase(), Phase::Acquiring);
    assert_eq!(
        coord.execute(trigger(Action::Restart, false)).await,
        ActionOutcome::Skipped(SkipReason::RebuildInProgress)
    );

    let outcome = with_timeout(waiting).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Completed(Action::Rebuild));
}

#[tokio::test(start_paused = true)]
async fn rebuild_waits_for_running_restart() {
    init_tracing();
    let engine = FakeEngine::new();
    engine.hold(EngineOp::Restart);
    let coord = coordinator(&engine);

    let restarting = tokio::spawn({
        let coord = coord.clone();
        async move { coord.execute(trigger(Action::Restart, false)).await }
    });
    with_timeout(engine.wait_for(EngineOp::Restart, 1)).await;
    assert_eq!(coord.lock().holder(), Some(Action::Restart));

    let rebuilding = tokio::spawn({
        let coord = coord.clone();
        async move { coord.execute(trigger(Action::Rebuild, false)).await }
    });
    sleep(Duration::from_secs(5)).await;
    assert!(!rebuilding.is_finished());
    assert_eq!(engine.count(EngineOp::Stop), 0);

    engine.release(EngineOp::Restart);
    assert_eq!(
        with_timeout(restarting).await.unwrap(),
        ActionOutcome::Completed(Action::Restart)
    );
    assert_eq!(
        with_timeout(rebuilding).await.unwrap(),
        ActionOutcome::Completed(Action::Rebuild)
    );
    assert_eq!(
        engine.calls(),
        vec![EngineOp::Restart, EngineOp::Stop, EngineOp::Build, EngineOp::Start]
    );
    assert!(!coord.lock().is_held());
}

#[tokio::test(start_paused = true)]
async fn rebuilds_queued_behind_restart_run_once() {
    let engine = FakeEngine::new();
    engine.hold(EngineOp::Restart);
    engine.hold(EngineOp::Build);
    let coord = coordinator(&engine);

    let restarting = tokio::spawn({
        let coord = coord.clone();
        async move { coord.execute(trigger(Action::Restart, false)).await }
    });
    with_timeout(engine.wait_for(EngineOp::Restart, 1)).await;

    let rebuilds: Vec<_> = (0..2)
        .map(|_| {
            let coord = coord.clone();
            tokio::spawn(async move { coord.execute(trigger(Action::Rebuild, false)).await })
        })
        .collect();
    sleep(Duration::from_millis(10)).await;

    engine.release(EngineOp::Restart);
    with_timeout(restarting).await.unwrap();
    with_timeout(engine.wait_for(EngineOp::Build, 1)).await;
    sleep(Duration::from_millis(10)).await;
    engine.release(EngineOp::Build);

    let mut outcomes = Vec::new();
    for rebuild in rebuilds {
        outcomes.push(with_timeout(rebuild).await.unwrap());
    }
    assert!(outcomes.contains(&ActionOutcome::Completed(Action::Rebuild)));
    assert!(outcomes.contains(&ActionOutcome::Skipped(SkipReason::LockContention)));
    assert_eq!(engine.count(EngineOp::Build), 1);
}

#[tokio::test(start_paused = true)]
async fn logs_cannot_be_run_as_a_step() {
    let engine = FakeEngine::new();

    assert!(matches!(
        engine.run(EngineOp::Logs, "api").await,
        Err(DockwatchError::EngineFailure { op: EngineOp::Logs, .. })
    ));
    assert!(engine.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn late_answer_goes_to_the_current_rebuild() {
    init_tracing();
    let prompts = PromptSlot::new();
    let (user, first_prompt) = oneshot::channel();

    // Nobody answers the first prompt in time.
    let first = timeout(Duration::from_secs(2), prompts.answer(|| first_prompt)).await;
    assert!(first.is_err());
    assert!(prompts.is_open());

    // The next ask reuses the open prompt and gets the user's "no".
    let second = tokio::spawn(async move {
        let answer = prompts
            .answer(|| panic!("a second prompt was opened"))
            .await;
        (answer.map_err(|e| e.to_string()), prompts.is_open())
    });
    sleep(Duration::from_millis(10)).await;
    user.send(Ok(Some(false))).unwrap();

    let (answer, still_open) = with_timeout(second).await.unwrap();
    assert_eq!(answer, Ok(Some(false)));
    assert!(!still_open);
}

#[tokio::test(start_paused = true)]
async fn answer_after_expiry_is_discarded() {
    let prompts = PromptSlot::new();
    let (user, first_prompt) = oneshot::channel();

    let first = timeout(Duration::from_secs(2), prompts.answer(|| first_prompt)).await;
    assert!(first.is_err());
    // Answered with nobody asking.
    user.send(Ok(Some(false))).unwrap();

    let opened = AtomicUsize::new(0);
    let answer = prompts
        .answer(|| {
            opened.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            tx.send(Ok(Some(true))).unwrap();
            rx
        })
        .await
        .unwrap();
    assert_eq!(answer, Some(true));
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(!prompts.is_open());
}

#[test]
fn policy_follows_confirm_mode() {
    let cfg = ConfigFileBuilder::new(ROOT).confirm(ConfirmMode::Always).build();
    assert_eq!(ConfirmPolicy::from_settings(&cfg.rebuild), ConfirmPolicy::AlwaysRebuild);

    let cfg = ConfigFileBuilder::new(ROOT).confirm(ConfirmMode::Never).build();
    assert_eq!(ConfirmPolicy::from_settings(&cfg.rebuild), ConfirmPolicy::AlwaysSkip);

    let cfg = ConfigFileBuilder::new(ROOT).confirm(ConfirmMode::Prompt).build();
    assert_eq!(
        ConfirmPolicy::from_settings(&cfg.rebuild),
        ConfirmPolicy::PromptWithTimeout(cfg.rebuild.prompt_timeout)
    );
}

#[tokio::test]
async fn successful_action_reconciles_hash_store() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(Path::new(ROOT).join("util.R"), "u <- 1");
    let cfg = ConfigFileBuilder::new(ROOT).build();
    let (classifier, store) = mock_classifier(&fs, &cfg);

    let engine = FakeEngine::new();
    let coord = coordinator(&engine).with_reconcile(classifier);

    // Drift while the engine was busy: a file nobody reported.
    fs.add_file(Path::new(ROOT).join("late.R"), "l <- 1");
    coord.execute(trigger(Action::Restart, false)).await;

    let keys = store.lock().unwrap().keys();
    assert_eq!(keys, vec!["late.R", "util.R"]);

    // A failed action leaves the store alone.
    fs.add_file(Path::new(ROOT).join("later.R"), "l <- 2");
    engine.fail_next(EngineOp::Restart);
    coord.execute(trigger(Action::Restart, false)).await;
    assert_eq!(store.lock().unwrap().get("later.R")?, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn log_stream_starts_once_after_success() {
    init_tracing();
    let engine = FakeEngine::new();
    engine.keep_logs_open(true);
    engine.set_log_lines(&["Running plumber API at http://0.0.0.0:8000"]);
    let guard = LogStreamGuard::new(Arc::new(engine.clone()), "api", 50);
    let coord = coordinator(&engine).with_log_stream(guard.clone());

    engine.fail_next(EngineOp::Restart);
    coord.execute(trigger(Action::Restart, false)).await;
    assert!(!guard.is_active());

    coord.execute(trigger(Action::Restart, false)).await;
    coord.execute(trigger(Action::Rebuild, false)).await;
    sleep(Duration::from_millis(10)).await;

    assert_eq!(engine.count(EngineOp::Logs), 1);
    assert_eq!(engine.live_log_sessions(), 1);

    guard.stop().await;
    assert_eq!(engine.live_log_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_service_reports_result() {
    let engine = FakeEngine::new();
    let coord = coordinator(&engine);

    assert!(coord.stop_service().await.is_ok());
    engine.fail_next(EngineOp::Stop);
    assert!(matches!(
        coord.stop_service().await,
        Err(DockwatchError::EngineFailure { op: EngineOp::Stop, .. })
    ));

    let _held = coord.lock().try_acquire(Action::Restart).unwrap();
    assert!(matches!(
        coord.stop_service().await,
        Err(DockwatchError::LockContention)
    ));
    assert_eq!(engine.count(EngineOp::Stop), 2);
}
