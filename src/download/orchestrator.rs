//! Per-task retry state machine and the paced download queue.
//!
//! Tasks run strictly one at a time. Between tasks the queue waits a random
//! jitter, and after every `cooldown_every` successes a longer cooldown, to
//! stay under the remote service's abuse detection.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use super::fetcher::{FetchError, FetchRequest, MediaFetcher, TransferSink};
use super::progress::{QueueEta, QueueProgress, TransferProgress, TransferTracker};
use super::ytdlp::remove_partials;
use super::{AudioFormat, DownloadTask, FetchFailure, Step, TaskState, next_step};
use crate::config::Config;
use crate::control::{Cancelled, SyncControl};
use crate::library::LibraryIndex;
use crate::lyrics::{CaptionFetcher, CaptionOptions, CaptionOutcome, LyricsStatus, fetch_captions, write_captions};
use crate::observer::SyncObserver;
use crate::organizer::sanitize_filename;

/// Pause before retrying a candidate after a network hiccup.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Everything the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub output_dir: PathBuf,
    pub format: AudioFormat,
    pub attempts_per_candidate: u32,
    pub forbidden_delay: Duration,
    pub transient_delay: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Cooldown after this many successes (0 disables)
    pub cooldown_every: u32,
    pub cooldown: Duration,
    pub progress_interval: Duration,
    pub progress_percent_step: f64,
    pub fallback_eta: Duration,
    /// Fetch lyrics right after each download
    pub fetch_lyrics: bool,
    pub captions: CaptionOptions,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let download = &config.download;
        let secs = |s: f64| Duration::from_secs_f64(if s.is_finite() { s.max(0.0) } else { 0.0 });
        Self {
            output_dir: config.library.library_path.clone(),
            format: config.library.audio_format,
            attempts_per_candidate: download.attempts_per_candidate.max(1),
            forbidden_delay: download.forbidden_delay(),
            transient_delay: TRANSIENT_RETRY_DELAY,
            jitter_min: secs(download.jitter_min_secs),
            jitter_max: secs(download.jitter_max_secs),
            cooldown_every: download.cooldown_every,
            cooldown: download.cooldown(),
            progress_interval: download.progress_interval(),
            progress_percent_step: download.progress_percent_step,
            fallback_eta: download.fallback_eta(),
            fetch_lyrics: config.lyrics.enabled,
            captions: CaptionOptions::from(&config.lyrics),
        }
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        rand::rng().random_range(self.jitter_min..self.jitter_max)
    }

    /// The wait after a task, given the successes so far including it.
    ///
    /// Nothing follows the last task or a short-circuited one. A due
    /// cooldown replaces the jitter.
    fn pacing_after(&self, outcome: &TaskOutcome, successes: u32, is_last: bool) -> Pacing {
        if is_last {
            return Pacing::None;
        }
        match outcome {
            TaskOutcome::AlreadyPresent(_) => Pacing::None,
            TaskOutcome::Downloaded(_)
                if self.cooldown_every > 0 && successes % self.cooldown_every == 0 =>
            {
                Pacing::Cooldown
            }
            _ => Pacing::Jitter,
        }
    }
}

/// Wait between two queued tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pacing {
    None,
    Jitter,
    Cooldown,
}

/// How one task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Downloaded(PathBuf),
    /// A file with the same key and target format showed up earlier in the run
    AlreadyPresent(PathBuf),
    Exhausted,
    Aborted(FetchFailure),
}

/// Counts for one queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub downloaded: usize,
    pub already_present: usize,
    pub exhausted: usize,
    pub aborted: usize,
    /// Raw text of every track that could not be fetched
    pub failed_tracks: Vec<String>,
}

impl QueueSummary {
    pub fn total(&self) -> usize {
        self.downloaded + self.already_present + self.exhausted + self.aborted
    }
}

/// Forwards fetch-tool progress to the observer, throttled, and is the
/// cancellation checkpoint inside a transfer.
struct ProgressSink<'s> {
    tracker: TransferTracker,
    observer: &'s dyn SyncObserver,
    control: &'s SyncControl,
}

#[async_trait]
impl TransferSink for ProgressSink<'_> {
    async fn on_transfer(&mut self, progress: TransferProgress) -> Result<(), Cancelled> {
        self.control.checkpoint().await?;
        if let Some(update) = self.tracker.observe(Instant::now(), &progress) {
            self.observer.on_transfer(&update);
        }
        Ok(())
    }
}

/// Drives the media fetcher for each planned task.
pub struct Orchestrator<'a> {
    fetcher: &'a dyn MediaFetcher,
    captions: Option<&'a dyn CaptionFetcher>,
    settings: OrchestratorSettings,
    observer: &'a dyn SyncObserver,
    control: SyncControl,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        fetcher: &'a dyn MediaFetcher,
        settings: OrchestratorSettings,
        observer: &'a dyn SyncObserver,
        control: SyncControl,
    ) -> Self {
        Self {
            fetcher,
            captions: None,
            settings,
            observer,
            control,
        }
    }

    /// Attach a caption source for post-download lyrics.
    pub fn with_captions(mut self, captions: &'a dyn CaptionFetcher) -> Self {
        self.captions = Some(captions);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn already_present(&self, task: &DownloadTask, index: &LibraryIndex) -> Option<PathBuf> {
        index
            .lookup(&task.track)
            .filter(|e| e.extension().as_deref() == Some(self.settings.format.extension()))
            .map(|e| e.path.clone())
    }

    /// Run one task to a terminal state.
    ///
    /// Per-track failures end in [`TaskOutcome::Exhausted`] or
    /// [`TaskOutcome::Aborted`]; only cancellation is an error.
    pub async fn run_task(
        &self,
        task: &mut DownloadTask,
        index: &mut LibraryIndex,
    ) -> Result<TaskOutcome, Cancelled> {
        if let Some(path) = self.already_present(task, index) {
            debug!(target: "download::task", track = %task.track, path = %path.display(), "Already present");
            task.state = TaskState::Succeeded(path.clone());
            return Ok(TaskOutcome::AlreadyPresent(path));
        }

        let file_stem = sanitize_filename(task.track.text());
        let mut last_failure: Option<(FetchFailure, String)> = None;
        task.state = TaskState::Searching;

        while let Some(query) = task.current_query().map(str::to_string) {
            self.control.checkpoint().await?;
            debug!(
                target: "download::task",
                track = %task.track,
                query = %query,
                candidate = task.candidate_index,
                attempt = task.attempt,
                "Fetching"
            );

            let request = FetchRequest {
                query,
                output_dir: self.settings.output_dir.clone(),
                file_stem: file_stem.clone(),
                format: self.settings.format,
            };
            let mut sink = ProgressSink {
                tracker: TransferTracker::new(
                    task.track.text(),
                    self.settings.progress_interval,
                    self.settings.progress_percent_step,
                ),
                observer: self.observer,
                control: &self.control,
            };

            let (kind, detail) = match self.fetcher.fetch(&request, &mut sink).await {
                Ok(produced) => match verify_output(&produced, &request) {
                    Some(path) => return self.finish_success(task, path, index).await,
                    None => (
                        FetchFailure::Unclassified,
                        format!("reported file {} is missing", produced.display()),
                    ),
                },
                Err(FetchError::Cancelled(cancelled)) => return Err(cancelled),
                Err(FetchError::Failed { kind, detail }) => (kind, detail),
            };

            let step = next_step(kind, task.attempt, self.settings.attempts_per_candidate);
            self.react(task, kind, &detail, step, &file_stem).await?;
            last_failure = Some((kind, detail));
            if !task.apply(step, kind) {
                break;
            }
        }

        if let TaskState::Aborted(reason) = task.state {
            return Ok(TaskOutcome::Aborted(reason));
        }

        task.state = TaskState::Exhausted;
        let message = match last_failure {
            Some((FetchFailure::Unclassified, detail)) => {
                format!("Failed to download '{}': {}", task.track, detail)
            }
            _ => format!("All search attempts failed for '{}'", task.track),
        };
        self.observer.on_warning(&message);
        Ok(TaskOutcome::Exhausted)
    }

    /// Side effects of one failed attempt, before the step is applied.
    async fn react(
        &self,
        task: &DownloadTask,
        kind: FetchFailure,
        detail: &str,
        step: Step,
        file_stem: &str,
    ) -> Result<(), Cancelled> {
        match kind {
            FetchFailure::CorruptedPartialArtifact => {
                self.control.check()?;
                let removed = remove_partials(&self.settings.output_dir, file_stem);
                warn!(target: "download::task", track = %task.track, removed, "Corrupted partial download, removed leftovers");
            }
            FetchFailure::AccessForbidden => {
                warn!(target: "download::task", track = %task.track, "Access forbidden, trying next query");
                self.control.sleep(self.settings.forbidden_delay).await?;
            }
            FetchFailure::BotOrVerificationChallenge => {
                self.observer.on_error(&format!(
                    "Bot verification required while fetching '{}'. The fetch tool's cookies or session need refreshing.",
                    task.track
                ));
            }
            FetchFailure::NotYetAvailable => {
                self.observer
                    .on_info(&format!("Skipping '{}': not yet available (upcoming premiere)", task.track));
            }
            FetchFailure::TransientNetwork => {
                debug!(target: "download::task", track = %task.track, detail, "Network error");
                if step == Step::RetrySame {
                    self.control.sleep(self.settings.transient_delay).await?;
                }
            }
            FetchFailure::NoResults => {
                debug!(target: "download::task", track = %task.track, query = ?task.current_query(), "No results");
            }
            FetchFailure::Unclassified => {
                debug!(target: "download::task", track = %task.track, detail, "Fetch failed");
            }
        }
        Ok(())
    }

    async fn finish_success(
        &self,
        task: &mut DownloadTask,
        path: PathBuf,
        index: &mut LibraryIndex,
    ) -> Result<TaskOutcome, Cancelled> {
        if let Err(e) = index.append(&path) {
            warn!(target: "download::task", path = %path.display(), error = %e, "Downloaded file not indexed");
        }
        info!(target: "download::task", track = %task.track, path = %path.display(), "Downloaded");
        self.observer.on_info(&format!("Downloaded '{}'", task.track));
        task.state = TaskState::Succeeded(path.clone());

        if self.settings.fetch_lyrics {
            if let Some(captions) = self.captions {
                self.attach_captions(captions, task.track.text(), &path).await?;
            }
        }
        Ok(TaskOutcome::Downloaded(path))
    }

    /// Best effort: nothing here fails the task.
    async fn attach_captions(
        &self,
        captions: &dyn CaptionFetcher,
        song: &str,
        audio: &Path,
    ) -> Result<(), Cancelled> {
        self.observer.on_lyrics_status(song, LyricsStatus::Searching);
        let status = match fetch_captions(captions, song, &self.settings.captions, &self.control).await? {
            CaptionOutcome::Found(text) => {
                self.control.check()?;
                match write_captions(audio, &text, self.settings.captions.script) {
                    Ok(_) => LyricsStatus::Found,
                    Err(e) => {
                        warn!(target: "download::task", path = %audio.display(), error = %e, "Failed to write lyrics");
                        LyricsStatus::Failed
                    }
                }
            }
            CaptionOutcome::NotFound => LyricsStatus::Failed,
            CaptionOutcome::Failed(e) => {
                debug!(target: "download::task", song, error = %e, "Lyrics lookup failed");
                LyricsStatus::Failed
            }
        };
        self.observer.on_lyrics_status(song, status);
        Ok(())
    }

    /// Run every task in order, pacing between them.
    pub async fn run_queue(
        &self,
        tasks: Vec<DownloadTask>,
        index: &mut LibraryIndex,
    ) -> Result<QueueSummary, Cancelled> {
        let total = tasks.len();
        let mut summary = QueueSummary::default();
        if total == 0 {
            return Ok(summary);
        }

        self.observer.on_info(&format!("Downloading {total} missing tracks"));
        let mut eta = QueueEta::new(self.settings.fallback_eta);
        let mut successes: u32 = 0;

        for (i, mut task) in tasks.into_iter().enumerate() {
            self.control.checkpoint().await?;
            let completed = i + 1;
            self.observer
                .on_info(&format!("[{completed}/{total}] {} ({})", task.track, task.playlist));

            let started = Instant::now();
            let outcome = self.run_task(&mut task, index).await?;
            match &outcome {
                TaskOutcome::Downloaded(_) => {
                    summary.downloaded += 1;
                    successes += 1;
                    eta.record(started.elapsed());
                }
                TaskOutcome::AlreadyPresent(_) => summary.already_present += 1,
                TaskOutcome::Exhausted => {
                    summary.exhausted += 1;
                    summary.failed_tracks.push(task.track.text().to_string());
                }
                TaskOutcome::Aborted(_) => {
                    summary.aborted += 1;
                    summary.failed_tracks.push(task.track.text().to_string());
                }
            }

            self.observer.on_queue_progress(&QueueProgress {
                completed,
                total,
                eta: Some(eta.estimate(total - completed)),
            });

            match self.settings.pacing_after(&outcome, successes, completed == total) {
                Pacing::Cooldown => {
                    self.observer.on_info(&format!(
                        "Cooling down for {}s after {successes} downloads",
                        self.settings.cooldown.as_secs()
                    ));
                    self.control.sleep(self.settings.cooldown).await?;
                }
                Pacing::Jitter => self.control.sleep(self.settings.jitter()).await?,
                Pacing::None => {}
            }
        }

        info!(
            target: "download::queue",
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            exhausted = summary.exhausted,
            aborted = summary.aborted,
            "Download queue finished"
        );
        Ok(summary)
    }
}

/// The fetcher's reported path if it exists, else the expected path if that does.
fn verify_output(produced: &Path, request: &FetchRequest) -> Option<PathBuf> {
    if produced.is_file() {
        return Some(produced.to_path_buf());
    }
    let expected = request.expected_path();
    expected.is_file().then_some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::candidates::{CandidateOptions, generate};
    use crate::playlist::TrackRef;
    use crate::test_utils::{MockCaptions, MockFetcher, RecordingObserver};
    use tempfile::tempdir;

    fn settings(dir: &Path) -> OrchestratorSettings {
        OrchestratorSettings {
            output_dir: dir.to_path_buf(),
            format: AudioFormat::Mp3,
            attempts_per_candidate: 2,
            forbidden_delay: Duration::ZERO,
            transient_delay: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            cooldown_every: 10,
            cooldown: Duration::ZERO,
            progress_interval: Duration::ZERO,
            progress_percent_step: 10.0,
            fallback_eta: Duration::from_secs(120),
            fetch_lyrics: false,
            captions: CaptionOptions {
                max_attempts: 1,
                query_delay: Duration::ZERO,
                backoff_unit: Duration::ZERO,
                script: None,
            },
        }
    }

    fn task(raw: &str) -> DownloadTask {
        DownloadTask::new(TrackRef::new(raw), "Mix", generate(raw, &CandidateOptions::default()))
    }

    #[tokio::test]
    async fn test_success_is_appended_to_index() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new().succeed("Artist - Song");
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        let mut index = LibraryIndex::new();
        let mut task = task("Artist - Song");
        let outcome = orchestrator.run_task(&mut task, &mut index).await.unwrap();

        let expected = dir.path().join("Artist - Song.mp3");
        assert_eq!(outcome, TaskOutcome::Downloaded(expected.clone()));
        assert_eq!(task.state, TaskState::Succeeded(expected.clone()));
        let entry = index.lookup(&TrackRef::new("Artist - Song")).unwrap();
        assert_eq!(entry.path, expected);
        assert_eq!(entry.key, TrackRef::new("Artist - Song").key());
        assert!(!observer.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_partial_artifact_is_removed_and_candidate_retried() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Artist - Song.webm.part"), b"junk").unwrap();
        let fetcher = MockFetcher::new()
            .fail("Artist - Song", FetchFailure::CorruptedPartialArtifact)
            .succeed("Artist - Song");
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        let mut index = LibraryIndex::new();
        let outcome = orchestrator.run_task(&mut task("Artist - Song"), &mut index).await.unwrap();

        assert!(matches!(outcome, TaskOutcome::Downloaded(_)));
        assert_eq!(fetcher.calls(), vec!["Artist - Song", "Artist - Song"]);
        assert!(!dir.path().join("Artist - Song.webm.part").exists());
    }

    #[tokio::test]
    async fn test_forbidden_advances_to_next_candidate() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .fail("Artist - Song", FetchFailure::AccessForbidden)
            .succeed("Artist Song");
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        let outcome = orchestrator
            .run_task(&mut task("Artist - Song"), &mut LibraryIndex::new())
            .await
            .unwrap();

        assert!(matches!(outcome, TaskOutcome::Downloaded(_)));
        assert_eq!(fetcher.calls(), vec!["Artist - Song", "Artist Song"]);
    }

    #[tokio::test]
    async fn test_bot_challenge_aborts_whole_task() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .fail("Artist - Song", FetchFailure::BotOrVerificationChallenge)
            .succeed("Artist Song");
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        let mut task = task("Artist - Song");
        let outcome = orchestrator.run_task(&mut task, &mut LibraryIndex::new()).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Aborted(FetchFailure::BotOrVerificationChallenge));
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(observer.errors().len(), 1);
        assert!(observer.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_no_results_everywhere_exhausts() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new();
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        let mut task = task("Artist - Song");
        let outcome = orchestrator.run_task(&mut task, &mut LibraryIndex::new()).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Exhausted);
        assert_eq!(task.state, TaskState::Exhausted);
        assert_eq!(fetcher.calls(), vec!["Artist - Song", "Artist Song", "Song"]);
        assert_eq!(observer.warnings().len(), 1);
        assert!(observer.warnings()[0].contains("All search attempts failed"));
    }

    #[tokio::test]
    async fn test_unclassified_failure_is_quiet_until_last_candidate() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .fail("Artist - Song", FetchFailure::Unclassified)
            .succeed("Artist Song");
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        orchestrator
            .run_task(&mut task("Artist - Song"), &mut LibraryIndex::new())
            .await
            .unwrap();
        assert!(observer.warnings().is_empty());

        let fetcher = MockFetcher::new().fail("Only", FetchFailure::Unclassified);
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());
        let outcome = orchestrator
            .run_task(&mut task("Only"), &mut LibraryIndex::new())
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Exhausted);
        assert_eq!(observer.warnings().len(), 1);
        assert!(observer.warnings()[0].starts_with("Failed to download 'Only'"));
    }

    #[tokio::test]
    async fn test_queue_short_circuits_same_key_and_reports_progress() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new().succeed("A - B");
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, SyncControl::new());

        let mut index = LibraryIndex::new();
        let summary = orchestrator
            .run_queue(vec![task("A - B"), task("B - A"), task("Missing")], &mut index)
            .await
            .unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.already_present, 1);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.failed_tracks, vec!["Missing"]);
        assert_eq!(summary.total(), 3);
        assert_eq!(fetcher.calls(), vec!["A - B", "Missing"]);

        let progress = observer.queue_progress();
        assert_eq!(progress.len(), 3);
        assert_eq!((progress[2].completed, progress[2].total), (3, 3));
        assert_eq!(progress[2].eta, Some(Duration::ZERO));
    }

    #[test]
    fn test_pacing_between_tasks() {
        let dir = tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.cooldown_every = 2;
        let done = TaskOutcome::Downloaded(dir.path().join("a.mp3"));
        let present = TaskOutcome::AlreadyPresent(dir.path().join("a.mp3"));

        assert_eq!(settings.pacing_after(&done, 1, false), Pacing::Jitter);
        assert_eq!(settings.pacing_after(&done, 2, false), Pacing::Cooldown);
        assert_eq!(settings.pacing_after(&done, 2, true), Pacing::None);
        assert_eq!(settings.pacing_after(&present, 2, false), Pacing::None);
        assert_eq!(settings.pacing_after(&TaskOutcome::Exhausted, 2, false), Pacing::Jitter);
        assert_eq!(
            settings.pacing_after(&TaskOutcome::Aborted(FetchFailure::NotYetAvailable), 3, false),
            Pacing::Jitter
        );

        settings.cooldown_every = 0;
        assert_eq!(settings.pacing_after(&done, 2, false), Pacing::Jitter);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let dir = tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.jitter_min = Duration::from_millis(100);
        settings.jitter_max = Duration::from_millis(300);
        for _ in 0..50 {
            let wait = settings.jitter();
            assert!(wait >= settings.jitter_min && wait < settings.jitter_max);
        }

        settings.jitter_max = settings.jitter_min;
        assert_eq!(settings.jitter(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_queue_cools_down_after_every_second_download() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new()
            .succeed("A - One")
            .succeed("A - Two")
            .succeed("A - Three")
            .succeed("A - Four")
            .succeed("A - Five")
            .succeed("A - Six");
        let observer = RecordingObserver::new();
        let mut settings = settings(dir.path());
        settings.cooldown_every = 2;
        let orchestrator = Orchestrator::new(&fetcher, settings, &observer, SyncControl::new());

        // "Two - A" shares a key with "A - Two" and short-circuits
        let queue = ["A - One", "A - Two", "Two - A", "A - Three", "A - Four", "A - Five", "A - Six"];
        let summary = orchestrator
            .run_queue(queue.iter().map(|t| task(t)).collect(), &mut LibraryIndex::new())
            .await
            .unwrap();
        assert_eq!(summary.downloaded, 6);
        assert_eq!(summary.already_present, 1);

        let infos = observer.infos();
        let cooldowns: Vec<&String> = infos.iter().filter(|m| m.starts_with("Cooling down")).collect();
        assert_eq!(
            cooldowns,
            vec!["Cooling down for 0s after 2 downloads", "Cooling down for 0s after 4 downloads"]
        );

        // Each cooldown comes right before the next task starts
        let before = |header: &str| {
            let pos = infos.iter().position(|m| m.starts_with(header)).unwrap();
            infos[pos - 1].clone()
        };
        assert!(before("[3/7]").starts_with("Cooling down"));
        assert!(!before("[4/7]").starts_with("Cooling down"));
        assert!(before("[6/7]").starts_with("Cooling down"));
        assert!(!infos.last().unwrap().starts_with("Cooling down"));
    }

    #[tokio::test]
    async fn test_lyrics_written_after_download() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new().succeed("Artist - Song");
        let captions = MockCaptions::new().with_lyrics("Artist - Song", "[00:01.00]hi");
        let observer = RecordingObserver::new();
        let mut settings = settings(dir.path());
        settings.fetch_lyrics = true;
        let orchestrator = Orchestrator::new(&fetcher, settings, &observer, SyncControl::new())
            .with_captions(&captions);

        orchestrator
            .run_task(&mut task("Artist - Song"), &mut LibraryIndex::new())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("Artist - Song.lrc")).unwrap(),
            "[00:01.00]hi"
        );
        assert_eq!(observer.last_status("Artist - Song"), Some(LyricsStatus::Found));
    }

    #[tokio::test]
    async fn test_lyrics_miss_does_not_fail_task() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new().succeed("Artist - Song");
        let captions = MockCaptions::new().failing_with_network();
        let observer = RecordingObserver::new();
        let mut settings = settings(dir.path());
        settings.fetch_lyrics = true;
        let orchestrator = Orchestrator::new(&fetcher, settings, &observer, SyncControl::new())
            .with_captions(&captions);

        let outcome = orchestrator
            .run_task(&mut task("Artist - Song"), &mut LibraryIndex::new())
            .await
            .unwrap();
        assert!(matches!(outcome, TaskOutcome::Downloaded(_)));
        assert_eq!(observer.last_status("Artist - Song"), Some(LyricsStatus::Failed));
    }

    #[tokio::test]
    async fn test_cancelled_queue_stops_before_fetching() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new().succeed("Artist - Song");
        let observer = RecordingObserver::new();
        let control = SyncControl::new();
        control.cancel();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, control);

        let result = orchestrator
            .run_queue(vec![task("Artist - Song")], &mut LibraryIndex::new())
            .await;
        assert_eq!(result, Err(Cancelled));
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_transfer_unwinds() {
        let dir = tempdir().unwrap();
        let control = SyncControl::new();
        let fetcher = MockFetcher::new()
            .succeed("Artist - Song")
            .cancel_on_progress(control.clone());
        let observer = RecordingObserver::new();
        let orchestrator = Orchestrator::new(&fetcher, settings(dir.path()), &observer, control);

        let mut index = LibraryIndex::new();
        let result = orchestrator.run_task(&mut task("Artist - Song"), &mut index).await;
        assert_eq!(result, Err(Cancelled));
        assert!(index.is_empty());
    }
}
