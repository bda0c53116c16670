//! Lyrics for files that are already in the library.
//!
//! Lookups are independent, so they run on a bounded pool. Workers share
//! the failure cache, a status map and a consecutive-failure counter; once
//! the counter reaches the threshold no new lookups start.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{
    CaptionFetcher, CaptionOptions, CaptionOutcome, FailureCache, LyricsStatus, fetch_captions,
    lrc_path_for, write_captions,
};
use crate::config::LyricsConfig;
use crate::control::{Cancelled, SyncControl};
use crate::library::LibraryIndex;
use crate::observer::SyncObserver;

/// Completions between two progress summaries.
const SUMMARY_EVERY: usize = 50;

/// An audio file without a sibling `.lrc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingLyrics {
    pub audio: PathBuf,
    /// Lookup name: the file stem
    pub song: String,
}

/// Pool settings.
#[derive(Debug, Clone)]
pub struct BackfillSettings {
    pub workers: usize,
    /// Stop after this many failures in a row (0 never stops)
    pub max_consecutive_failures: usize,
    pub retry_failed: bool,
    pub options: CaptionOptions,
}

impl From<&LyricsConfig> for BackfillSettings {
    fn from(config: &LyricsConfig) -> Self {
        Self {
            workers: config.max_workers.max(1),
            max_consecutive_failures: config.max_consecutive_failures,
            retry_failed: config.retry_failed,
            options: CaptionOptions::from(config),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSummary {
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Skipped because the failure cache already lists them
    pub cached: usize,
    /// Never looked up because the phase stopped early
    pub skipped: usize,
    pub stopped_early: bool,
}

/// Every indexed audio file lacking lyrics, sorted by path.
pub fn missing_lyrics(index: &LibraryIndex) -> Vec<MissingLyrics> {
    let mut missing: Vec<MissingLyrics> = index
        .entries()
        .filter(|e| !lrc_path_for(&e.path).exists())
        .filter_map(|e| {
            let song = e.path.file_stem()?.to_string_lossy().into_owned();
            Some(MissingLyrics {
                audio: e.path.clone(),
                song,
            })
        })
        .collect();
    missing.sort_by(|a, b| a.audio.cmp(&b.audio));
    missing
}

enum Lookup {
    Found,
    NotFound,
    Failed,
    Skipped,
}

struct Shared<'a> {
    fetcher: &'a dyn CaptionFetcher,
    cache: &'a FailureCache,
    settings: &'a BackfillSettings,
    observer: &'a dyn SyncObserver,
    control: &'a SyncControl,
    statuses: Mutex<HashMap<String, LyricsStatus>>,
    consecutive_failures: AtomicUsize,
    stop: AtomicBool,
}

impl Shared<'_> {
    fn set_status(&self, song: &str, status: LyricsStatus) {
        self.statuses.lock().insert(song.to_string(), status);
        self.observer.on_lyrics_status(song, status);
    }

    /// Songs currently in `status`.
    fn count(&self, status: LyricsStatus) -> usize {
        self.statuses.lock().values().filter(|s| **s == status).count()
    }

    fn note_failure(&self) {
        let count = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let limit = self.settings.max_consecutive_failures;
        if limit > 0 && count >= limit && !self.stop.swap(true, Ordering::SeqCst) {
            self.observer.on_warning(&format!(
                "Lyrics backfill stopped after {count} failures in a row; the lyrics service may be unreachable"
            ));
        }
    }
}

async fn lookup_one(item: MissingLyrics, shared: &Shared<'_>) -> Result<Lookup, Cancelled> {
    if shared.stop.load(Ordering::SeqCst) {
        return Ok(Lookup::Skipped);
    }
    shared.set_status(&item.song, LyricsStatus::Searching);

    let outcome = fetch_captions(shared.fetcher, &item.song, &shared.settings.options, shared.control).await?;
    match outcome {
        CaptionOutcome::Found(text) => {
            shared.control.check()?;
            if let Err(e) = write_captions(&item.audio, &text, shared.settings.options.script) {
                warn!(target: "lyrics::backfill", path = %item.audio.display(), error = %e, "Failed to write lyrics");
                shared.set_status(&item.song, LyricsStatus::Failed);
                shared.note_failure();
                return Ok(Lookup::Failed);
            }
            shared.consecutive_failures.store(0, Ordering::SeqCst);
            if let Err(e) = shared.cache.forget(&item.song) {
                debug!(target: "lyrics::backfill", error = %e, "Failed to update lyrics cache");
            }
            shared.set_status(&item.song, LyricsStatus::Found);
            Ok(Lookup::Found)
        }
        CaptionOutcome::NotFound => {
            if let Err(e) = shared.cache.record(&item.song, "not_found") {
                warn!(target: "lyrics::backfill", error = %e, "Failed to persist lyrics cache");
            }
            shared.set_status(&item.song, LyricsStatus::Failed);
            shared.note_failure();
            Ok(Lookup::NotFound)
        }
        CaptionOutcome::Failed(e) => {
            debug!(target: "lyrics::backfill", song = %item.song, error = %e, "Lyrics lookup failed");
            shared.set_status(&item.song, LyricsStatus::Failed);
            shared.note_failure();
            Ok(Lookup::Failed)
        }
    }
}

/// Look up lyrics for `items` on a pool of `settings.workers`.
pub async fn backfill(
    items: Vec<MissingLyrics>,
    fetcher: &dyn CaptionFetcher,
    cache: &FailureCache,
    settings: &BackfillSettings,
    observer: &dyn SyncObserver,
    control: &SyncControl,
) -> Result<BackfillSummary, Cancelled> {
    let mut summary = BackfillSummary::default();

    let (items, cached): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|item| settings.retry_failed || !cache.contains(&item.song));
    summary.cached = cached.len();
    if summary.cached > 0 {
        debug!(target: "lyrics::backfill", cached = summary.cached, "Skipping songs listed in the failure cache");
    }
    if items.is_empty() {
        return Ok(summary);
    }

    let total = items.len();
    observer.on_info(&format!("Looking up lyrics for {total} songs"));

    let shared = Shared {
        fetcher,
        cache,
        settings,
        observer,
        control,
        statuses: Mutex::new(HashMap::new()),
        consecutive_failures: AtomicUsize::new(0),
        stop: AtomicBool::new(false),
    };
    for item in &items {
        shared.set_status(&item.song, LyricsStatus::Waiting);
    }

    let mut results = stream::iter(items)
        .map(|item| lookup_one(item, &shared))
        .buffer_unordered(settings.workers.max(1));

    let mut completed = 0;
    while let Some(result) = results.next().await {
        match result? {
            Lookup::Found => summary.found += 1,
            Lookup::NotFound => summary.not_found += 1,
            Lookup::Failed => summary.failed += 1,
            Lookup::Skipped => summary.skipped += 1,
        }
        completed += 1;
        if completed % SUMMARY_EVERY == 0 || completed == total {
            let searching = shared.count(LyricsStatus::Searching);
            let waiting = shared.count(LyricsStatus::Waiting);
            info!(
                target: "lyrics::backfill",
                completed,
                total,
                searching,
                waiting,
                found = summary.found,
                failed = summary.not_found + summary.failed,
                "Lyrics backfill progress"
            );
            observer.on_info(&format!(
                "Lyrics progress: {completed}/{total} done, {searching} searching, {waiting} waiting"
            ));
        }
    }

    summary.stopped_early = shared.stop.load(Ordering::SeqCst);
    observer.on_info(&format!(
        "Lyrics: {} found, {} not found, {} failed",
        summary.found, summary.not_found, summary.failed
    ));
    Ok(summary)
}
