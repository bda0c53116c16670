//! Test utilities and fixtures for playlist-keeper tests.
//!
//! This module provides mock collaborators and config helpers to reduce
//! boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MockFetcher, RecordingObserver};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let fetcher = MockFetcher::new().succeed("Artist - Song");
//!     let observer = RecordingObserver::new();
//!     // ... test logic
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::Config;
use crate::control::SyncControl;
use crate::download::progress::{QueueProgress, TransferProgress, TransferUpdate};
use crate::download::{FetchError, FetchFailure, FetchRequest, MediaFetcher, TransferSink};
use crate::lyrics::{CaptionError, CaptionFetcher, LyricsStatus};
use crate::observer::SyncObserver;
use crate::playlist::{FetchedPlaylist, PlaylistSource, SourceError, TrackRef};

/// Creates a config whose every path lives under `dir`.
///
/// Keep the TempDir alive for the duration of your test.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.library.library_path = dir.join("Library");
    config.library.playlists_path = dir.join("Playlists");
    config.library.export_path = dir.join("Export");
    config.library.data_path = dir.join("data");
    config
}

/// Writes a small placeholder file at `dir/name` and returns its path.
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    std::fs::write(&path, b"audio").expect("Failed to write fixture file");
    path
}

// ============================================================================
// Media fetcher
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Success,
    Failure(FetchFailure),
}

/// Scripted fetcher.
///
/// Each query has a queue of responses, consumed one per call. Queries with
/// nothing scripted (or an exhausted queue) fail with `NoResults`. A success
/// reports one progress sample, then creates the expected output file.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    cancel_on_progress: Option<SyncControl>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, query: &str, response: Scripted) -> Self {
        self.responses
            .lock()
            .entry(query.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Next call for `query` produces a file.
    pub fn succeed(self, query: &str) -> Self {
        self.push(query, Scripted::Success)
    }

    /// Next call for `query` fails with `kind`.
    pub fn fail(self, query: &str, kind: FetchFailure) -> Self {
        self.push(query, Scripted::Failure(kind))
    }

    /// Trip `control` right before reporting progress, as Ctrl-C mid-transfer would.
    pub fn cancel_on_progress(mut self, control: SyncControl) -> Self {
        self.cancel_on_progress = Some(control);
        self
    }

    /// Queries in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: &mut dyn TransferSink,
    ) -> Result<PathBuf, FetchError> {
        self.calls.lock().push(request.query.clone());
        let response = self
            .responses
            .lock()
            .get_mut(&request.query)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Scripted::Failure(FetchFailure::NoResults));

        match response {
            Scripted::Failure(kind) => Err(FetchError::Failed {
                kind,
                detail: format!("scripted {kind}"),
            }),
            Scripted::Success => {
                if let Some(control) = &self.cancel_on_progress {
                    control.cancel();
                }
                sink.on_transfer(TransferProgress {
                    downloaded: 512,
                    total: Some(1024),
                    rate: Some(256.0),
                    eta: None,
                })
                .await?;

                let path = request.expected_path();
                std::fs::create_dir_all(&request.output_dir).expect("Failed to create output dir");
                std::fs::write(&path, b"audio").expect("Failed to write fetched file");
                Ok(path)
            }
        }
    }
}

// ============================================================================
// Caption fetcher
// ============================================================================

/// Caption source answering from a fixed query → lyrics table.
#[derive(Default)]
pub struct MockCaptions {
    lyrics: HashMap<String, String>,
    network_down: bool,
    calls: Mutex<Vec<String>>,
}

impl MockCaptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lyrics(mut self, query: &str, text: &str) -> Self {
        self.lyrics.insert(query.to_string(), text.to_string());
        self
    }

    /// Every search fails with a network error.
    pub fn failing_with_network(mut self) -> Self {
        self.network_down = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CaptionFetcher for MockCaptions {
    async fn search(&self, query: &str) -> Result<Option<String>, CaptionError> {
        self.calls.lock().push(query.to_string());
        if self.network_down {
            return Err(CaptionError::Network("connection refused".to_string()));
        }
        Ok(self.lyrics.get(query).cloned())
    }
}

// ============================================================================
// Playlist source
// ============================================================================

/// Source serving fixed playlists; unknown ids are `NotFound`.
#[derive(Default)]
pub struct MockSource {
    playlists: HashMap<String, FetchedPlaylist>,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(mut self, id: &str, name: &str, tracks: &[&str]) -> Self {
        self.playlists.insert(
            id.to_string(),
            FetchedPlaylist {
                display_name: name.to_string(),
                tracks: tracks.iter().map(|t| TrackRef::new(*t)).collect(),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PlaylistSource for MockSource {
    async fn fetch(&self, id: &str) -> Result<FetchedPlaylist, SourceError> {
        self.calls.lock().push(id.to_string());
        self.playlists
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Observer that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    transfers: Mutex<Vec<TransferUpdate>>,
    queue: Mutex<Vec<QueueProgress>>,
    statuses: Mutex<Vec<(String, LyricsStatus)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn transfers(&self) -> Vec<TransferUpdate> {
        self.transfers.lock().clone()
    }

    pub fn queue_progress(&self) -> Vec<QueueProgress> {
        self.queue.lock().clone()
    }

    /// Most recent lyrics status reported for `track`.
    pub fn last_status(&self, track: &str) -> Option<LyricsStatus> {
        self.statuses
            .lock()
            .iter()
            .rev()
            .find(|(t, _)| t == track)
            .map(|(_, s)| *s)
    }
}

impl SyncObserver for RecordingObserver {
    fn on_info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn on_warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn on_transfer(&self, update: &TransferUpdate) {
        self.transfers.lock().push(update.clone());
    }

    fn on_queue_progress(&self, progress: &QueueProgress) {
        self.queue.lock().push(*progress);
    }

    fn on_lyrics_status(&self, track: &str, status: LyricsStatus) {
        self.statuses.lock().push((track.to_string(), status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::AudioFormat;

    struct NullSink;

    #[async_trait]
    impl TransferSink for NullSink {
        async fn on_transfer(&mut self, _progress: TransferProgress) -> Result<(), crate::control::Cancelled> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mock_fetcher_consumes_script_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .fail("q", FetchFailure::AccessForbidden)
            .succeed("q");
        let request = FetchRequest {
            query: "q".into(),
            output_dir: dir.path().to_path_buf(),
            file_stem: "Song".into(),
            format: AudioFormat::Mp3,
        };

        let first = fetcher.fetch(&request, &mut NullSink).await;
        assert_eq!(first.unwrap_err().kind(), Some(FetchFailure::AccessForbidden));
        let second = fetcher.fetch(&request, &mut NullSink).await.unwrap();
        assert!(second.exists());
        let third = fetcher.fetch(&request, &mut NullSink).await;
        assert_eq!(third.unwrap_err().kind(), Some(FetchFailure::NoResults));
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[test]
    fn test_config_paths_live_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(config.library.library_path.starts_with(dir.path()));
        assert!(config.library.lyrics_cache_path().starts_with(dir.path()));
    }
}
