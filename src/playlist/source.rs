//! Playlist source collaborators and the refresh phase.
//!
//! A source turns an opaque id into a display name plus an ordered list of
//! `Artist - Title` strings. The refresh phase persists each result as a
//! simple-format playlist and records when it last ran.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::{TrackRef, parse_playlist_text, playlist_name, read_playlist, write_simple};
use crate::config::{self, Config};
use crate::control::{Cancelled, SyncControl};
use crate::observer::SyncObserver;
use crate::organizer::sanitize_filename;
use crate::planner::{ReconciliationReport, diff_snapshot};

/// Errors from a playlist source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Failed to read source {id}: {message}")]
    Read { id: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Source {0} returned no tracks")]
    Empty(String),
}

/// What a source returns for one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPlaylist {
    pub display_name: String,
    pub tracks: Vec<TrackRef>,
}

/// Trait for playlist providers.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<FetchedPlaylist, SourceError>;
}

/// Source whose id is a path to a local text or M3U track list.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalListSource;

#[async_trait]
impl PlaylistSource for LocalListSource {
    async fn fetch(&self, id: &str) -> Result<FetchedPlaylist, SourceError> {
        let path = Path::new(id);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(id.to_string()));
            }
            Err(e) => {
                return Err(SourceError::Read {
                    id: id.to_string(),
                    message: e.to_string(),
                });
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        Ok(FetchedPlaylist {
            display_name: playlist_name(path),
            tracks: parse_playlist_text(&text),
        })
    }
}

/// Outcome of one refresh phase.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reports: Vec<ReconciliationReport>,
}

/// Refresh every configured source that has not been synced `today`.
///
/// Per-source failures are reported and skipped. The config is saved to
/// `config_path` after each successful refresh so an interrupted run keeps
/// what it already fetched.
pub async fn refresh_sources(
    config: &mut Config,
    config_path: Option<&Path>,
    source: &dyn PlaylistSource,
    today: NaiveDate,
    control: &SyncControl,
    observer: &dyn SyncObserver,
) -> Result<RefreshSummary, Cancelled> {
    let mut summary = RefreshSummary::default();
    let playlists_dir = config.library.playlists_path.clone();

    for i in 0..config.sources.len() {
        control.checkpoint().await?;

        let entry = config.sources[i].clone();
        let label = entry.name.clone().unwrap_or_else(|| entry.id.clone());
        if entry.last_synced == Some(today) {
            debug!(target: "sync::refresh", source = %label, "Already synced today");
            observer.on_info(&format!("Skipping {label}: already synced today"));
            summary.skipped += 1;
            continue;
        }

        let fetched = match source.fetch(&entry.id).await {
            Ok(fetched) if fetched.tracks.is_empty() => {
                observer.on_warning(&SourceError::Empty(label).to_string());
                summary.failed += 1;
                continue;
            }
            Ok(fetched) => fetched,
            Err(e) => {
                observer.on_warning(&format!("Could not refresh {label}: {e}"));
                summary.failed += 1;
                continue;
            }
        };

        control.check()?;
        let path = snapshot_path(&playlists_dir, &fetched.display_name);
        let previous = if path.exists() {
            read_playlist(&path).unwrap_or_default()
        } else {
            Vec::new()
        };
        let report = diff_snapshot(&fetched.display_name, &previous, &fetched.tracks);

        if let Err(e) = std::fs::create_dir_all(&playlists_dir)
            .map_err(crate::error::Error::from)
            .and_then(|_| write_simple(&path, &fetched.tracks))
        {
            observer.on_error(&format!("Could not save {}: {e}", path.display()));
            summary.failed += 1;
            continue;
        }

        info!(
            target: "sync::refresh",
            playlist = %fetched.display_name,
            tracks = fetched.tracks.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            "Playlist refreshed"
        );
        observer.on_info(&format!(
            "Saved {} tracks to {}",
            fetched.tracks.len(),
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ));

        let slot = &mut config.sources[i];
        slot.name = Some(fetched.display_name);
        slot.last_synced = Some(today);
        if let Some(path) = config_path {
            if let Err(e) = config::save_to(config, path) {
                warn!(target: "sync::refresh", error = %e, "Failed to save config");
            }
        }

        summary.refreshed += 1;
        if !report.is_empty() {
            summary.reports.push(report);
        }
    }

    Ok(summary)
}

/// Where a source's snapshot lives.
pub fn snapshot_path(playlists_dir: &Path, display_name: &str) -> PathBuf {
    playlists_dir.join(format!("{}.m3u", sanitize_filename(display_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::test_utils::{MockSource, RecordingObserver, test_config};
    use tempfile::tempdir;

    fn source_entry(id: &str, last_synced: Option<NaiveDate>) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            name: None,
            last_synced,
        }
    }

    #[tokio::test]
    async fn test_local_list_source_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Chill.txt");
        std::fs::write(&path, "A - One\nB - Two\n").unwrap();

        let fetched = LocalListSource.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(fetched.display_name, "Chill");
        assert_eq!(fetched.tracks.len(), 2);

        let missing = LocalListSource.fetch("/definitely/not/here.txt").await;
        assert!(matches!(missing, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_refresh_writes_snapshot_and_diffs() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.sources.push(source_entry("mix", None));
        std::fs::create_dir_all(&config.library.playlists_path).unwrap();
        std::fs::write(
            config.library.playlists_path.join("Daily Mix.m3u"),
            "Old - Song\nKeep - Song\n",
        )
        .unwrap();

        let source = MockSource::new().with_playlist("mix", "Daily Mix", &["Keep - Song", "New - Song"]);
        let observer = RecordingObserver::default();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let config_file = dir.path().join("config.toml");

        let summary = refresh_sources(
            &mut config,
            Some(&config_file),
            &source,
            today,
            &SyncControl::new(),
            &observer,
        )
        .await
        .unwrap();

        assert_eq!(summary.refreshed, 1);
        let report = &summary.reports[0];
        assert!(report.added.contains("New - Song"));
        assert!(report.removed.contains("Old - Song"));

        let written = read_playlist(&config.library.playlists_path.join("Daily Mix.m3u")).unwrap();
        assert_eq!(written, vec![TrackRef::new("Keep - Song"), TrackRef::new("New - Song")]);
        assert_eq!(config.sources[0].last_synced, Some(today));
        assert_eq!(config.sources[0].name.as_deref(), Some("Daily Mix"));
        assert!(config_file.exists());
    }

    #[tokio::test]
    async fn test_refresh_skips_synced_today_and_survives_failures() {
        let dir = tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut config = test_config(dir.path());
        config.sources.push(source_entry("done", Some(today)));
        config.sources.push(source_entry("broken", None));
        config.sources.push(source_entry("empty", None));

        let source = MockSource::new().with_playlist("empty", "Empty", &[]);
        let observer = RecordingObserver::default();

        let summary = refresh_sources(&mut config, None, &source, today, &SyncControl::new(), &observer)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.refreshed, 0);
        assert_eq!(source.calls(), vec!["broken".to_string(), "empty".to_string()]);
        assert!(observer.warnings().len() >= 2);
    }

    #[tokio::test]
    async fn test_refresh_stops_on_cancel() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.sources.push(source_entry("a", None));
        let control = SyncControl::new();
        control.cancel();

        let source = MockSource::new();
        let result = refresh_sources(
            &mut config,
            None,
            &source,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &control,
            &RecordingObserver::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(source.calls().is_empty());
    }
}
