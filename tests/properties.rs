// tests/properties.rs

mod common;
use crate::common::builders::{mock_classifier, ConfigFileBuilder};
use crate::common::{FakeEngine, ROOT};

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

use dockwatch::engine::{
    Action, ConfirmPolicy, DebounceScheduler, DebounceWindow, RebuildCoordinator, StdinConfirmer,
    Trigger,
};
use dockwatch::fs::mock::MockFileSystem;
use dockwatch::types::EngineOp;
use dockwatch::watch::{ChangeEvent, ChangeKind, Classification, ClassifiedChange};

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn classification_strategy() -> impl Strategy<Value = Classification> {
    prop_oneof![
        Just(Classification::Ignore),
        Just(Classification::DeleteAck),
        Just(Classification::Restart),
        Just(Classification::RebuildRequired),
    ]
}

fn op_strategy() -> impl Strategy<Value = Option<EngineOp>> {
    prop_oneof![
        Just(None),
        Just(Some(EngineOp::Stop)),
        Just(Some(EngineOp::Build)),
        Just(Some(EngineOp::Start)),
        Just(Some(EngineOp::Restart)),
    ]
}

proptest! {
    /// However often the watcher repeats itself, each distinct content
    /// version produces exactly one qualifying classification.
    #[test]
    fn duplicate_notifications_are_idempotent(
        versions in proptest::collection::vec(0u8..4, 1..20),
        repeats in proptest::collection::vec(1usize..4, 20),
    ) {
        let fs = MockFileSystem::new();
        let cfg = ConfigFileBuilder::new(ROOT).build();
        let (classifier, _store) = mock_classifier(&fs, &cfg);
        let path = Path::new(ROOT).join("util.R");

        let mut qualifying = 0;
        for (i, version) in versions.iter().enumerate() {
            fs.add_file(&path, format!("v{version}"));
            for _ in 0..repeats[i] {
                let c = classifier.observe(&ChangeEvent::new(path.clone(), ChangeKind::Modified));
                if c.classification.is_qualifying() {
                    qualifying += 1;
                }
            }
        }

        let distinct = 1 + versions.windows(2).filter(|w| w[0] != w[1]).count();
        prop_assert_eq!(qualifying, distinct);
    }

    /// The window's trigger carries the strongest qualifying action and
    /// exists only if something qualified.
    #[test]
    fn window_keeps_strongest_action(
        changes in proptest::collection::vec(classification_strategy(), 1..30),
    ) {
        let mut window = DebounceWindow::new();
        let mut last = None;
        for (i, classification) in changes.iter().enumerate() {
            let change = ClassifiedChange {
                classification: *classification,
                key: format!("f{i}.R"),
                needs_confirmation: false,
            };
            if let Some(generation) = window.record(&change) {
                last = Some(generation);
            }
        }

        let expected = changes
            .iter()
            .filter_map(|c| Action::from_classification(*c))
            .max();
        let got = last.and_then(|g| window.take(g)).map(|t| t.action);
        prop_assert_eq!(got, expected);
    }

    /// Any burst whose gaps are all shorter than the quiet period yields one
    /// trigger, delivered one quiet period after the last change.
    #[test]
    fn bursts_coalesce_into_one_trigger(
        gaps_ms in proptest::collection::vec(0u64..1900, 0..12),
    ) {
        let (triggers, fired_after_last) = paused_runtime().block_on(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<Trigger>();
            let debouncer = DebounceScheduler::new(Duration::from_secs(2), tx);

            let restart = ClassifiedChange {
                classification: Classification::Restart,
                key: "util.R".to_string(),
                needs_confirmation: false,
            };
            debouncer.record(&restart);
            let mut last = Instant::now();
            for gap in gaps_ms.iter() {
                sleep(Duration::from_millis(*gap)).await;
                debouncer.record(&restart);
                last = Instant::now();
            }

            let mut triggers = Vec::new();
            let mut fired_after_last = Duration::ZERO;
            while let Ok(Some(trigger)) = timeout(Duration::from_secs(10), rx.recv()).await {
                if triggers.is_empty() {
                    fired_after_last = last.elapsed();
                }
                triggers.push(trigger);
            }
            (triggers, fired_after_last)
        });

        prop_assert_eq!(triggers.len(), 1);
        prop_assert_eq!(&triggers[0].paths, &BTreeSet::from(["util.R".to_string()]));
        prop_assert!(fired_after_last >= Duration::from_secs(2));
        prop_assert!(fired_after_last < Duration::from_millis(2050));
    }

    /// Whatever the engine does, the lock is free once `execute` returns.
    #[test]
    fn lock_is_never_left_held(
        steps in proptest::collection::vec((any::<bool>(), op_strategy()), 1..25),
    ) {
        let held_after = paused_runtime().block_on(async move {
            let engine = FakeEngine::new();
            let coordinator = RebuildCoordinator::new(
                Arc::new(engine.clone()),
                "api",
                ConfirmPolicy::AlwaysRebuild,
                Arc::new(StdinConfirmer::new()),
            );

            let mut held_after = Vec::new();
            for (rebuild, failing) in steps {
                if let Some(op) = failing {
                    engine.fail_next(op);
                }
                let action = if rebuild { Action::Rebuild } else { Action::Restart };
                coordinator
                    .execute(Trigger {
                        action,
                        paths: BTreeSet::new(),
                        needs_confirmation: false,
                    })
                    .await;
                held_after.push(coordinator.lock().is_held());
            }
            held_after
        });

        prop_assert!(held_after.iter().all(|held| !held));
    }
}
