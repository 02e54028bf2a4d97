// src/engine/confirm.rs

//! Confirmation of rebuilds requested by special files.
//!
//! The policy decides; a [`Confirmer`] is only consulted for
//! [`ConfirmPolicy::PromptWithTimeout`]. Any failure to get an answer (no
//! terminal, timeout, read error) resolves to rebuilding.

use std::future::Future;
use std::io::IsTerminal;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::config::model::RebuildSettings;
use crate::engine::Trigger;
use crate::types::ConfirmMode;

/// How to confirm a rebuild that needs confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
    AlwaysRebuild,
    AlwaysSkip,
    /// Ask, and rebuild if no answer arrives in time.
    PromptWithTimeout(Duration),
}

impl ConfirmPolicy {
    pub fn from_settings(settings: &RebuildSettings) -> Self {
        match settings.confirm {
            ConfirmMode::Always => ConfirmPolicy::AlwaysRebuild,
            ConfirmMode::Never => ConfirmPolicy::AlwaysSkip,
            ConfirmMode::Prompt => ConfirmPolicy::PromptWithTimeout(settings.prompt_timeout),
        }
    }

    /// Decide whether `trigger` should go ahead.
    pub async fn decide(&self, confirmer: &dyn Confirmer, trigger: &Trigger) -> bool {
        let timeout = match *self {
            ConfirmPolicy::AlwaysRebuild => return true,
            ConfirmPolicy::AlwaysSkip => {
                info!(paths = ?trigger.paths, "rebuild declined by policy");
                return false;
            }
            ConfirmPolicy::PromptWithTimeout(timeout) => timeout,
        };

        let question = format!(
            "Rebuild required for changes in {}. Rebuild now?",
            join_paths(trigger)
        );

        match tokio::time::timeout(timeout, confirmer.ask(&question)).await {
            Ok(Ok(yes)) => {
                if !yes {
                    info!(paths = ?trigger.paths, "rebuild declined");
                }
                yes
            }
            Ok(Err(err)) => {
                warn!(error = %err, "no confirmation channel; proceeding with rebuild");
                true
            }
            Err(_) => {
                info!(timeout = ?timeout, "no answer before timeout; proceeding with rebuild");
                true
            }
        }
    }
}

/// Interactive yes/no channel.
pub trait Confirmer: Send + Sync {
    /// Show `question` and return whether the user agreed.
    fn ask(&self, question: &str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;
}

fn join_paths(trigger: &Trigger) -> String {
    trigger
        .paths
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Answer channel of one prompt: `Some(yes)`, or `None` when dismissed.
pub type PromptAnswer = oneshot::Receiver<Result<Option<bool>>>;

/// At most one prompt on the terminal at a time.
///
/// An ask that times out leaves its prompt open. The next ask waits on that
/// same prompt instead of opening a second reader, so the user's answer
/// reaches the rebuild currently asking. An answer given after its asker
/// gave up is discarded and a fresh prompt is opened.
#[derive(Debug, Default)]
pub struct PromptSlot {
    pending: Mutex<Option<PromptAnswer>>,
}

/// Puts an unanswered prompt back in the slot if the ask is dropped.
struct Parked<'a> {
    slot: &'a Mutex<Option<PromptAnswer>>,
    answer: Option<PromptAnswer>,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        if let Some(answer) = self.answer.take() {
            *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(answer);
        }
    }
}

impl PromptSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for an answer, calling `open` only if no prompt is still open.
    pub async fn answer(&self, open: impl FnOnce() -> PromptAnswer) -> Result<Option<bool>> {
        let answer = {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            match pending.take() {
                Some(mut earlier) => match earlier.try_recv() {
                    Err(TryRecvError::Empty) => {
                        info!("earlier rebuild prompt still open; its answer applies now");
                        earlier
                    }
                    Ok(_) => {
                        debug!("discarding answer given after its prompt expired");
                        open()
                    }
                    Err(TryRecvError::Closed) => open(),
                },
                None => open(),
            }
        };

        let mut parked = Parked {
            slot: &self.pending,
            answer: Some(answer),
        };
        let Some(answer) = parked.answer.as_mut() else {
            return Err(anyhow!("prompt vanished"));
        };
        let res = answer.await;
        parked.answer = None;
        res.map_err(|_| anyhow!("prompt ended without an answer"))?
    }

    pub fn is_open(&self) -> bool {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }
}

/// Prompts on the controlling terminal with `dialoguer`.
///
/// The prompt runs on a detached thread so one left unanswered after the
/// timeout never holds up process exit.
#[derive(Debug, Default)]
pub struct StdinConfirmer {
    prompts: PromptSlot,
}

impl StdinConfirmer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open_terminal_prompt(question: String) -> PromptAnswer {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let res = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(true)
            .interact_opt()
            .map_err(anyhow::Error::from);
        let _ = tx.send(res);
    });
    rx
}

impl Confirmer for StdinConfirmer {
    fn ask(&self, question: &str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let question = question.to_string();

        Box::pin(async move {
            if !std::io::stdin().is_terminal() {
                return Err(anyhow!("stdin is not a terminal"));
            }
            let answer = self
                .prompts
                .answer(move || open_terminal_prompt(question))
                .await?;
            // Esc dismisses the prompt, which counts as a no.
            Ok(answer.unwrap_or(false))
        })
    }
}
