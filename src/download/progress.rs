//! Transfer progress throttling and queue ETA.
//!
//! Each task owns a [`TransferTracker`]; the queue owns one [`QueueEta`].
//! Both take `now` explicitly so timing logic stays testable.

use std::time::{Duration, Instant};

/// Raw progress as reported by the fetch tool.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Bytes per second.
    pub rate: Option<f64>,
    pub eta: Option<Duration>,
}

/// A throttled, user-facing progress update for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferUpdate {
    pub track: String,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub percent: Option<f64>,
    pub rate: Option<f64>,
    pub eta: Option<Duration>,
}

/// Queue-level progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueProgress {
    pub completed: usize,
    pub total: usize,
    pub eta: Option<Duration>,
}

/// Per-task timing state.
#[derive(Debug, Clone)]
pub struct TransferTracker {
    track: String,
    interval: Duration,
    percent_step: f64,
    last_emit: Option<Instant>,
    last_percent: f64,
}

impl TransferTracker {
    pub fn new(track: impl Into<String>, interval: Duration, percent_step: f64) -> Self {
        Self {
            track: track.into(),
            interval,
            percent_step,
            last_emit: None,
            last_percent: 0.0,
        }
    }

    /// Feed one raw sample. Returns an update when either the time window
    /// has elapsed or the percentage moved by at least the step.
    pub fn observe(&mut self, now: Instant, sample: &TransferProgress) -> Option<TransferUpdate> {
        let total = sample.total.filter(|t| *t > 0);
        let percent = total.map(|t| (sample.downloaded as f64 / t as f64 * 100.0).min(100.0));
        let eta = transfer_eta(sample);

        let elapsed_ok = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        let current = percent.unwrap_or(0.0);
        let step_ok = (current - self.last_percent).abs() >= self.percent_step;

        if !(elapsed_ok || step_ok) {
            return None;
        }

        self.last_emit = Some(now);
        self.last_percent = current;
        Some(TransferUpdate {
            track: self.track.clone(),
            downloaded: sample.downloaded,
            total,
            percent,
            rate: sample.rate.filter(|r| *r > 0.0),
            eta,
        })
    }
}

/// Tool-reported ETA if positive, else remaining bytes over current rate.
pub fn transfer_eta(sample: &TransferProgress) -> Option<Duration> {
    if let Some(eta) = sample.eta.filter(|e| !e.is_zero()) {
        return Some(eta);
    }
    let rate = sample.rate.filter(|r| *r > 0.0)?;
    let total = sample.total?;
    if total <= sample.downloaded {
        return None;
    }
    Some(Duration::from_secs_f64((total - sample.downloaded) as f64 / rate))
}

/// Running average of finished task durations.
#[derive(Debug, Clone)]
pub struct QueueEta {
    finished: u32,
    elapsed: Duration,
    fallback: Duration,
}

impl QueueEta {
    pub fn new(fallback: Duration) -> Self {
        Self {
            finished: 0,
            elapsed: Duration::ZERO,
            fallback,
        }
    }

    pub fn record(&mut self, took: Duration) {
        self.finished += 1;
        self.elapsed += took;
    }

    pub fn average(&self) -> Option<Duration> {
        (self.finished > 0).then(|| self.elapsed / self.finished)
    }

    /// Estimated time left for `remaining` tasks: the running average per
    /// task, or the fallback before any task has finished.
    pub fn estimate(&self, remaining: usize) -> Duration {
        let per_task = self.average().unwrap_or(self.fallback);
        per_task * remaining as u32
    }
}

/// Human-readable transfer rate.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.2} MB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.1} KB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// `m:ss`
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
