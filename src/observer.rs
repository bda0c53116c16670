//! User-visible progress and log channel for sync runs.
//!
//! Pipeline stages report through [`SyncObserver`] instead of printing;
//! the CLI installs [`TracingObserver`], tests install a recorder.

use tracing::{error, info, warn};

use crate::download::progress::{QueueProgress, TransferUpdate, format_eta, format_rate};
use crate::lyrics::LyricsStatus;
use crate::stats::mib;

/// Receives user-facing events from a sync run.
///
/// Implementations must be cheap; they are called from inside transfer
/// callbacks and from backfill workers concurrently.
pub trait SyncObserver: Send + Sync {
    fn on_info(&self, message: &str);

    fn on_warning(&self, message: &str);

    fn on_error(&self, message: &str);

    /// Throttled per-transfer progress.
    fn on_transfer(&self, _update: &TransferUpdate) {}

    /// Queue-level progress, emitted once per finished task.
    fn on_queue_progress(&self, _progress: &QueueProgress) {}

    fn on_lyrics_status(&self, _track: &str, _status: LyricsStatus) {}
}

/// Forwards every event to `tracing` under the `sync::user` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_info(&self, message: &str) {
        info!(target: "sync::user", "{message}");
    }

    fn on_warning(&self, message: &str) {
        warn!(target: "sync::user", "{message}");
    }

    fn on_error(&self, message: &str) {
        error!(target: "sync::user", "{message}");
    }

    fn on_transfer(&self, update: &TransferUpdate) {
        let rate = update.rate.map(format_rate).unwrap_or_else(|| "waiting".to_string());
        let eta = update.eta.map(format_eta).unwrap_or_else(|| "--:--".to_string());
        match (update.percent, update.total) {
            (Some(pct), Some(total)) => info!(
                target: "sync::user",
                "  {:.1}% | {:.1}/{:.1} MB | {} | ETA {}",
                pct,
                mib(update.downloaded),
                mib(total),
                rate,
                eta
            ),
            _ => info!(target: "sync::user", "  {:.1} MB | {}", mib(update.downloaded), rate),
        }
    }

    fn on_queue_progress(&self, progress: &QueueProgress) {
        let eta = progress.eta.map(format_eta).unwrap_or_else(|| "--:--".to_string());
        info!(
            target: "sync::user",
            completed = progress.completed,
            total = progress.total,
            "Queue {}/{} (ETA {})",
            progress.completed,
            progress.total,
            eta
        );
    }

    fn on_lyrics_status(&self, track: &str, status: LyricsStatus) {
        tracing::debug!(target: "lyrics::status", track, ?status, "Lyrics status");
    }
}
