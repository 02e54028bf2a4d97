// src/engine/lock.rs

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::engine::Action;

/// Observable state of the rebuild lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    InProgress,
}

#[derive(Debug, Default)]
struct Shared {
    holder: Mutex<Option<Action>>,
    released: Notify,
}

/// Process-wide mutual exclusion for container actions.
///
/// [`RebuildLock::try_acquire`] never waits: a busy lock means the caller
/// skips its action. [`RebuildLock::acquire_rebuild`] waits out a restart
/// but still gives up when a rebuild holds the lock. The guard releases the
/// lock when dropped, whichever way the holder exits (success, engine
/// failure, panic or task abort).
#[derive(Debug, Clone, Default)]
pub struct RebuildLock {
    shared: Arc<Shared>,
}

impl RebuildLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn holder_slot(&self) -> MutexGuard<'_, Option<Action>> {
        self.shared.holder.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn try_acquire(&self, action: Action) -> Option<RebuildGuard> {
        let mut holder = self.holder_slot();
        if holder.is_some() {
            return None;
        }
        *holder = Some(action);
        Some(RebuildGuard {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Acquire for a rebuild, waiting while a restart holds the lock.
    ///
    /// Returns `None` as soon as the lock is seen held by another rebuild.
    pub async fn acquire_rebuild(&self) -> Option<RebuildGuard> {
        loop {
            let mut released = pin!(self.shared.released.notified());
            released.as_mut().enable();

            if self.holder() == Some(Action::Rebuild) {
                return None;
            }
            if let Some(guard) = self.try_acquire(Action::Rebuild) {
                return Some(guard);
            }
            released.await;
        }
    }

    /// The action currently holding the lock.
    pub fn holder(&self) -> Option<Action> {
        *self.holder_slot()
    }

    pub fn is_held(&self) -> bool {
        self.holder().is_some()
    }

    pub fn state(&self) -> LockState {
        if self.is_held() {
            LockState::InProgress
        } else {
            LockState::Idle
        }
    }
}

/// Proof of holding the [`RebuildLock`].
#[derive(Debug)]
pub struct RebuildGuard {
    shared: Arc<Shared>,
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        *self.shared.holder.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.shared.released.notify_waiters();
    }
}
