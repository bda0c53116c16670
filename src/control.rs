//! Cooperative cancellation and pause for long-running sync work.
//!
//! A [`SyncControl`] is cloned into every phase of the pipeline and checked
//! at defined checkpoints only: before each network call, before each file
//! write, and inside every transfer progress callback. Cancelling unwinds at
//! the next checkpoint; pausing blocks there until resumed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Returned from a checkpoint once the run has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    paused: bool,
    cancelled: bool,
}

/// Shared cancel/pause token.
#[derive(Debug, Clone)]
pub struct SyncControl {
    state: Arc<watch::Sender<ControlState>>,
}

impl Default for SyncControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Trip the cancellation flag. Irreversible.
    pub fn cancel(&self) {
        self.state.send_modify(|s| s.cancelled = true);
    }

    pub fn pause(&self) {
        self.state.send_modify(|s| s.paused = true);
    }

    pub fn resume(&self) {
        self.state.send_modify(|s| s.paused = false);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Non-blocking check for synchronous code paths.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Async checkpoint: fails if cancelled, waits while paused.
    pub async fn checkpoint(&self) -> Result<(), Cancelled> {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.cancelled {
                return Err(Cancelled);
            }
            if !state.paused {
                return Ok(());
            }
            // Sender lives in self, so this only errors if the channel is torn down
            if rx.changed().await.is_err() {
                return Err(Cancelled);
            }
        }
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if rx.borrow_and_update().cancelled {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep that wakes early on cancellation, then honours pause.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if !duration.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = self.cancelled() => return Err(Cancelled),
            }
        }
        self.checkpoint().await
    }
}
