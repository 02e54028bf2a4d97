// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_from_path;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::{
    ConfirmPolicy, DebounceScheduler, LogStreamGuard, RebuildCoordinator, Runtime, RuntimeEvent,
    RuntimeOptions, StdinConfirmer,
};
use crate::exec::{ComposeEngine, ContainerEngine};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{ConfirmMode, HashStorageMode};
use crate::watch::{
    initial_scan, scan_tracked_files, shared, spawn_watcher, ChangeClassifier, FileHashStore,
    MemoryHashStore, SharedHashStore, TrackedFilter,
};

/// Load the config named on the command line, apply CLI overrides and
/// validate the result.
pub fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = load_from_path(PathBuf::from(&args.config))?;
    apply_overrides(&mut raw, args);
    Ok(ConfigFile::try_from(raw)?)
}

/// CLI flags take precedence over the file.
pub fn apply_overrides(raw: &mut RawConfigFile, args: &CliArgs) {
    if let Some(ref service) = args.service {
        raw.service.name = Some(service.clone());
    }
    if args.yes {
        raw.rebuild.confirm = ConfirmMode::Always;
    }
    if args.no_logs {
        raw.service.follow_logs = false;
    }
}

/// Open the hash store selected by `[hashes].storage`.
pub fn open_store(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Result<SharedHashStore> {
    Ok(match cfg.hashes.storage {
        HashStorageMode::File => shared(FileHashStore::open(fs, cfg.hashes.path.clone())?),
        HashStorageMode::Memory => shared(MemoryHashStore::new()),
    })
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - hash store + classifier, seeded by an initial scan
/// - debouncer, coordinator and container engine
/// - the file watcher
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs, cfg: ConfigFile) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let filter = TrackedFilter::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg);
        print_tracked(&scan_tracked_files(fs.as_ref(), &filter)?);
        return Ok(());
    }

    let store = open_store(&cfg, Arc::clone(&fs))?;
    let classifier = Arc::new(ChangeClassifier::new(
        fs,
        filter,
        cfg.watch.auxiliary_files.clone(),
        store,
    ));

    {
        let classifier = Arc::clone(&classifier);
        tokio::task::spawn_blocking(move || initial_scan(&classifier)).await??;
    }

    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let debouncer = DebounceScheduler::new(cfg.watch.debounce, trigger_tx);

    let engine: Arc<dyn ContainerEngine> = Arc::new(ComposeEngine::from_settings(&cfg.service));
    let mut coordinator = RebuildCoordinator::new(
        Arc::clone(&engine),
        cfg.service.name.clone(),
        ConfirmPolicy::from_settings(&cfg.rebuild),
        Arc::new(StdinConfirmer::new()),
    )
    .with_reconcile(Arc::clone(&classifier));
    if cfg.service.follow_logs {
        coordinator = coordinator.with_log_stream(LogStreamGuard::new(
            engine,
            cfg.service.name.clone(),
            cfg.service.log_tail,
        ));
    }

    let watcher = spawn_watcher(Arc::clone(&classifier), debouncer.clone())?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(8);
    spawn_signal_handler(rt_tx);

    let options = RuntimeOptions {
        shutdown_grace: cfg.service.shutdown_grace,
        stop_on_exit: cfg.service.stop_on_exit,
    };

    info!(
        service = %cfg.service.name,
        root = ?cfg.root(),
        debounce = ?cfg.watch.debounce,
        dirs = ?watcher.dirs(),
        "watching for changes"
    );

    Runtime::new(coordinator, debouncer, trigger_rx, rt_rx, options)
        .with_watcher(watcher)
        .run()
        .await;
    Ok(())
}

/// Ctrl-C (and SIGTERM on unix) → graceful shutdown.
fn spawn_signal_handler(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        if !wait_for_shutdown_signal().await {
            return;
        }
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            warn!(error = %err, "failed to listen for SIGTERM");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        received = ctrl_c() => received,
        _ = term.recv() => {
            info!("received SIGTERM");
            true
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> bool {
    ctrl_c().await
}

async fn ctrl_c() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => true,
        Err(err) => {
            eprintln!("failed to listen for Ctrl+C: {err}");
            false
        }
    }
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("dockwatch dry-run");
    println!();

    println!("watch:");
    println!("  root: {:?}", cfg.watch.root);
    println!("  extensions: {:?}", cfg.watch.extensions);
    println!("  special_files: {:?}", cfg.watch.special_files);
    if !cfg.watch.auxiliary_files.is_empty() {
        println!("  auxiliary_files: {:?}", cfg.watch.auxiliary_files);
    }
    if !cfg.watch.exclude.is_empty() {
        println!("  exclude: {:?}", cfg.watch.exclude);
    }
    println!("  debounce: {:?}", cfg.watch.debounce);
    println!();

    println!("service:");
    println!("  name: {}", cfg.service.name);
    println!("  compose_file: {:?}", cfg.service.compose_file);
    println!("  docker_bin: {}", cfg.service.docker_bin);
    println!("  follow_logs: {}", cfg.service.follow_logs);
    if cfg.service.follow_logs {
        println!("  log_tail: {}", cfg.service.log_tail);
    }
    println!("  stop_on_exit: {}", cfg.service.stop_on_exit);
    println!("  shutdown_grace: {:?}", cfg.service.shutdown_grace);
    println!();

    println!("hashes: {:?} at {:?}", cfg.hashes.storage, cfg.hashes.path);
    println!(
        "rebuild: confirm = {:?}, prompt_timeout = {:?}",
        cfg.rebuild.confirm, cfg.rebuild.prompt_timeout
    );
    if let Some(ref file) = cfg.logging.file {
        println!(
            "logging: file = {:?}, rotation = {:?}, max_files = {}",
            file, cfg.logging.rotation, cfg.logging.max_files
        );
    }
}

fn print_tracked(files: &[PathBuf]) {
    println!();
    println!("tracked files ({}):", files.len());
    for file in files {
        println!("  {}", file.display());
    }
    debug!("dry-run complete (no watching)");
}
