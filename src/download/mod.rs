//! Download orchestration: from a missing track to a file on disk.
//!
//! - [`candidates`] ranks search queries for a track
//! - [`fetcher`] is the seam to the external fetch tool, plus failure
//!   classification
//! - [`ytdlp`] drives the real tool as a subprocess
//! - [`progress`] throttles transfer updates and estimates queue ETA
//! - [`orchestrator`] runs the per-task state machine and the paced queue

pub mod candidates;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod ytdlp;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::playlist::TrackRef;

pub use fetcher::{FetchError, FetchRequest, MediaFetcher, TransferSink, classify_failure};
pub use orchestrator::{Orchestrator, QueueSummary, TaskOutcome};

/// Target container/codec for downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Flac,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
        }
    }

    /// Quality argument for the transcode step.
    pub fn quality(self) -> &'static str {
        match self {
            Self::Mp3 => "320K",
            Self::Flac => "0",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Classified fetch failure. Produced only by [`classify_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FetchFailure {
    #[error("transient network error")]
    TransientNetwork,

    #[error("corrupted partial download (HTTP 416)")]
    CorruptedPartialArtifact,

    #[error("access forbidden (HTTP 403)")]
    AccessForbidden,

    #[error("sign-in or bot verification required")]
    BotOrVerificationChallenge,

    #[error("no search results")]
    NoResults,

    #[error("not yet available (upcoming premiere)")]
    NotYetAvailable,

    #[error("unclassified fetch failure")]
    Unclassified,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Try the same query again.
    RetrySame,
    /// Move to the next candidate query.
    AdvanceCandidate,
    /// Give up on the whole task.
    Abort,
}

/// Retry policy: pure decision from the failure kind and attempt count.
///
/// `attempt` is zero-based for the current candidate.
pub fn next_step(failure: FetchFailure, attempt: u32, attempts_per_candidate: u32) -> Step {
    let attempts_left = attempt + 1 < attempts_per_candidate;
    match failure {
        FetchFailure::BotOrVerificationChallenge | FetchFailure::NotYetAvailable => Step::Abort,
        FetchFailure::CorruptedPartialArtifact | FetchFailure::TransientNetwork if attempts_left => {
            Step::RetrySame
        }
        FetchFailure::CorruptedPartialArtifact
        | FetchFailure::TransientNetwork
        | FetchFailure::AccessForbidden
        | FetchFailure::NoResults
        | FetchFailure::Unclassified => Step::AdvanceCandidate,
    }
}

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Searching,
    Succeeded(PathBuf),
    /// Every candidate failed.
    Exhausted,
    /// Stopped early; the failure that caused it.
    Aborted(FetchFailure),
}

/// One missing track queued for download. Lives for one sync run only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub track: TrackRef,
    /// First playlist that asked for this track.
    pub playlist: String,
    pub candidates: Vec<String>,
    pub candidate_index: usize,
    pub attempt: u32,
    pub state: TaskState,
}

impl DownloadTask {
    pub fn new(track: TrackRef, playlist: &str, candidates: Vec<String>) -> Self {
        Self {
            track,
            playlist: playlist.to_string(),
            candidates,
            candidate_index: 0,
            attempt: 0,
            state: TaskState::Pending,
        }
    }

    pub fn current_query(&self) -> Option<&str> {
        self.candidates.get(self.candidate_index).map(String::as_str)
    }

    /// Apply a retry decision. Returns false once candidates run out.
    pub fn apply(&mut self, step: Step, failure: FetchFailure) -> bool {
        match step {
            Step::RetrySame => {
                self.attempt += 1;
                true
            }
            Step::AdvanceCandidate => {
                self.candidate_index += 1;
                self.attempt = 0;
                if self.candidate_index >= self.candidates.len() {
                    self.state = TaskState::Exhausted;
                    false
                } else {
                    true
                }
            }
            Step::Abort => {
                self.state = TaskState::Aborted(failure);
                false
            }
        }
    }
}
