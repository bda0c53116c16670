//! The full sync pipeline.
//!
//! Phases run in a fixed order and share one [`LibraryIndex`], updated in
//! place as files are downloaded and moved:
//!
//! 1. tidy library filenames
//! 2. refresh playlist sources
//! 3. discover playlists, index the library
//! 4. plan and run the download queue
//! 5. backfill lyrics for files that have none
//! 6. quarantine orphans and rewrite the quarantine listing
//! 7. statistics
//!
//! Per-track problems are reported through the observer. Only cancellation
//! and unusable library/playlist folders end a run with an error.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::config::Config;
use crate::control::SyncControl;
use crate::download::candidates::CandidateOptions;
use crate::download::orchestrator::OrchestratorSettings;
use crate::download::{DownloadTask, MediaFetcher, Orchestrator, QueueSummary};
use crate::error::{Result, ResultExt};
use crate::library::LibraryIndex;
use crate::lyrics::backfill::BackfillSettings;
use crate::lyrics::{BackfillSummary, CaptionFetcher, FailureCache, backfill, missing_lyrics};
use crate::observer::SyncObserver;
use crate::organizer::{self, TidySummary};
use crate::planner::{self, Completeness};
use crate::playlist::source::RefreshSummary;
use crate::playlist::{self, PlaylistDefinition, PlaylistSource, refresh_sources};
use crate::reconcile::{ReconcileSummary, UnsortedReconciler};
use crate::stats::{self, LibraryStats};

/// Discover wanted playlists and index the library.
///
/// The quarantine listing is not a wanted playlist and is left out. A
/// library folder that does not exist yet indexes as empty.
pub async fn load_state(config: &Config) -> Result<(Vec<PlaylistDefinition>, LibraryIndex)> {
    let library = &config.library;
    let mut playlists = playlist::discover(&library.playlists_path, &config.sources)?;
    playlists.retain(|p| p.name != library.quarantine_playlist);
    let index = if library.library_path.is_dir() {
        LibraryIndex::scan(&library.library_path).await?
    } else {
        debug!(target: "sync", path = %library.library_path.display(), "Library folder does not exist yet");
        LibraryIndex::new()
    };
    Ok((playlists, index))
}

/// External collaborators a sync run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub source: &'a dyn PlaylistSource,
    pub fetcher: &'a dyn MediaFetcher,
    pub captions: &'a dyn CaptionFetcher,
    pub observer: &'a dyn SyncObserver,
}

/// What a full run did, phase by phase.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub tidy: TidySummary,
    pub refresh: RefreshSummary,
    /// Tasks in the download queue
    pub planned: usize,
    pub downloads: QueueSummary,
    /// `None` when backfill is disabled
    pub lyrics: Option<BackfillSummary>,
    pub reconcile: ReconcileSummary,
    pub completeness: Vec<Completeness>,
    pub stats: LibraryStats,
}

/// Result of a dry run.
#[derive(Debug)]
pub struct SyncPlan {
    pub tasks: Vec<DownloadTask>,
    pub completeness: Vec<Completeness>,
}

pub struct SyncEngine<'a> {
    config: Config,
    config_path: Option<PathBuf>,
    collaborators: Collaborators<'a>,
    control: SyncControl,
    today: NaiveDate,
}

impl<'a> SyncEngine<'a> {
    pub fn new(config: Config, collaborators: Collaborators<'a>, control: SyncControl) -> Self {
        Self {
            config,
            config_path: None,
            collaborators,
            control,
            today: Local::now().date_naive(),
        }
    }

    /// Save source refresh results to this config file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override the local date used for the once-per-day source refresh.
    #[cfg(test)]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config.library.library_path, &self.config.library.playlists_path] {
            std::fs::create_dir_all(dir).with_context(format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    async fn load_state(&self) -> Result<(Vec<PlaylistDefinition>, LibraryIndex)> {
        load_state(&self.config).await
    }

    /// Discover, index and plan without touching any file.
    pub async fn plan_only(&self) -> Result<SyncPlan> {
        let (playlists, index) = self.load_state().await?;
        let tasks = planner::plan(&playlists, &index, &CandidateOptions::from(&self.config.download));
        Ok(SyncPlan {
            tasks,
            completeness: planner::completeness(&playlists, &index),
        })
    }

    /// Run every phase once.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let observer = self.collaborators.observer;
        let mut report = SyncReport::default();
        self.ensure_dirs()?;
        let library_path = self.config.library.library_path.clone();

        self.control.check()?;
        report.tidy = match organizer::tidy_filenames(&library_path) {
            Ok(summary) => summary,
            Err(e) => {
                observer.on_warning(&format!("Filename tidy failed: {e:#}"));
                TidySummary::default()
            }
        };

        self.control.check()?;
        report.refresh = refresh_sources(
            &mut self.config,
            self.config_path.as_deref(),
            self.collaborators.source,
            self.today,
            &self.control,
            observer,
        )
        .await?;

        self.control.check()?;
        let (playlists, mut index) = self.load_state().await?;
        observer.on_info(&format!(
            "Found {} playlists, {} files in library",
            playlists.len(),
            index.len()
        ));

        let tasks = planner::plan(&playlists, &index, &CandidateOptions::from(&self.config.download));
        report.planned = tasks.len();
        if tasks.is_empty() {
            observer.on_info("All playlist tracks are already in the library");
        }

        let orchestrator = Orchestrator::new(
            self.collaborators.fetcher,
            OrchestratorSettings::from_config(&self.config),
            observer,
            self.control.clone(),
        )
        .with_captions(self.collaborators.captions);
        report.downloads = orchestrator.run_queue(tasks, &mut index).await?;
        for track in &report.downloads.failed_tracks {
            debug!(target: "sync", track = %track, "Not downloaded");
        }

        self.control.check()?;
        let lyrics = &self.config.lyrics;
        if lyrics.enabled && lyrics.backfill {
            report.lyrics = Some(self.backfill_lyrics(&index).await?);
        }

        self.control.check()?;
        report.reconcile = UnsortedReconciler::new(&self.config.library, &self.control)
            .reconcile(&playlists, &mut index)?;

        report.completeness = planner::completeness(&playlists, &index);
        report.stats = stats::compute(&index, &playlists);

        info!(
            target: "sync",
            planned = report.planned,
            downloaded = report.downloads.downloaded,
            failed = report.downloads.failed_tracks.len(),
            quarantined = report.reconcile.moved,
            recovered = report.reconcile.recovered,
            "Sync finished"
        );
        Ok(report)
    }

    /// Lyrics for library files outside the quarantine that have none yet.
    pub async fn backfill_lyrics(&self, index: &LibraryIndex) -> Result<BackfillSummary> {
        let quarantine = self.config.library.quarantine_path();
        let mut items = missing_lyrics(index);
        items.retain(|item| !item.audio.starts_with(&quarantine));

        let cache = FailureCache::load(self.config.library.lyrics_cache_path());
        let summary = backfill(
            items,
            self.collaborators.captions,
            &cache,
            &BackfillSettings::from(&self.config.lyrics),
            self.collaborators.observer,
            &self.control,
        )
        .await?;
        Ok(summary)
    }

    /// Index the library and run only the quarantine pass.
    pub async fn reconcile_only(&self) -> Result<ReconcileSummary> {
        self.ensure_dirs()?;
        let (playlists, mut index) = self.load_state().await?;
        UnsortedReconciler::new(&self.config.library, &self.control).reconcile(&playlists, &mut index)
    }
}
