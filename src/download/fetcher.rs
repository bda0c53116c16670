//! The boundary to the external media-fetch tool.
//!
//! Everything above this module works with [`FetchFailure`] kinds; raw tool
//! output is inspected only by [`classify_failure`].

use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::progress::TransferProgress;
use super::{AudioFormat, FetchFailure};
use crate::control::Cancelled;

/// One fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Search query, as free text
    pub query: String,
    pub output_dir: PathBuf,
    /// File name without extension
    pub file_stem: String,
    pub format: AudioFormat,
}

impl FetchRequest {
    /// Path the finished file is expected at.
    pub fn expected_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.file_stem, self.format.extension()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{kind}: {detail}")]
    Failed { kind: FetchFailure, detail: String },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl FetchError {
    /// Build a failure from raw tool output.
    pub fn from_output(output: &str) -> Self {
        Self::Failed {
            kind: classify_failure(output),
            detail: strip_ansi(output).trim().to_string(),
        }
    }

    pub fn kind(&self) -> Option<FetchFailure> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::Cancelled(_) => None,
        }
    }
}

/// Receives byte-level progress during a fetch.
///
/// Returning `Err(Cancelled)` makes the fetcher stop the transfer.
#[async_trait]
pub trait TransferSink: Send {
    async fn on_transfer(&mut self, progress: TransferProgress) -> Result<(), Cancelled>;
}

/// Trait for media fetch tools.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Search for `request.query`, download the best match and transcode it.
    /// Returns the path of the produced file.
    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: &mut dyn TransferSink,
    ) -> Result<PathBuf, FetchError>;
}

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap());

static BOT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bbot\b").unwrap());

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Map raw tool error text to a failure kind. First match wins.
pub fn classify_failure(output: &str) -> FetchFailure {
    let text = strip_ansi(output).to_lowercase();

    if text.contains("premieres in") {
        FetchFailure::NotYetAvailable
    } else if text.contains("416") {
        FetchFailure::CorruptedPartialArtifact
    } else if text.contains("403") || text.contains("forbidden") {
        FetchFailure::AccessForbidden
    } else if text.contains("sign in") || text.contains("not a bot") || BOT_WORD.is_match(&text) {
        FetchFailure::BotOrVerificationChallenge
    } else if ["timed out", "timeout", "connection reset", "network is unreachable", "temporary failure in name resolution", "connection aborted", "eof occurred"]
        .iter()
        .any(|needle| text.contains(needle))
    {
        FetchFailure::TransientNetwork
    } else if text.contains("no video results") || text.contains("no results") || text.contains("no entries") {
        FetchFailure::NoResults
    } else {
        FetchFailure::Unclassified
    }
}
