//! Wanted-versus-present diffing.
//!
//! [`plan`] turns playlists plus a fresh index into the download queue;
//! [`diff_snapshot`] compares two versions of one playlist for review;
//! [`completeness`] summarises how much of each playlist is on disk.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::download::DownloadTask;
use crate::download::candidates::{CandidateOptions, generate};
use crate::library::LibraryIndex;
use crate::playlist::{PlaylistDefinition, TrackRef};

/// Literal-text changes to one playlist since its previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub playlist: String,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl ReconciliationReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// How much of one playlist is present in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness {
    pub playlist: String,
    pub missing: usize,
    pub total: usize,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }
}

/// Build the download queue.
///
/// Tracks are visited in playlist order; a track becomes a task when the
/// index has no match and no earlier task carries the same raw text. The
/// task is attributed to the first playlist that asked for it.
pub fn plan(
    playlists: &[PlaylistDefinition],
    index: &LibraryIndex,
    options: &CandidateOptions,
) -> Vec<DownloadTask> {
    let mut queued: HashSet<&str> = HashSet::new();
    let mut tasks = Vec::new();

    for playlist in playlists {
        for track in &playlist.tracks {
            if index.lookup(track).is_some() {
                continue;
            }
            if !queued.insert(track.text()) {
                continue;
            }
            let candidates = generate(track.text(), options);
            if candidates.is_empty() {
                debug!(target: "sync::plan", track = %track, "No usable search query, skipping");
                continue;
            }
            tasks.push(DownloadTask::new(track.clone(), &playlist.name, candidates));
        }
    }

    debug!(target: "sync::plan", tasks = tasks.len(), "Download queue planned");
    tasks
}

/// Set difference on raw text between two versions of a playlist.
pub fn diff_snapshot(playlist: &str, previous: &[TrackRef], current: &[TrackRef]) -> ReconciliationReport {
    let before: BTreeSet<&str> = previous.iter().map(TrackRef::text).collect();
    let after: BTreeSet<&str> = current.iter().map(TrackRef::text).collect();

    ReconciliationReport {
        playlist: playlist.to_string(),
        added: after.difference(&before).map(|s| s.to_string()).collect(),
        removed: before.difference(&after).map(|s| s.to_string()).collect(),
    }
}

/// Per-playlist presence counts.
pub fn completeness(playlists: &[PlaylistDefinition], index: &LibraryIndex) -> Vec<Completeness> {
    playlists
        .iter()
        .map(|p| Completeness {
            playlist: p.name.clone(),
            missing: p.tracks.iter().filter(|t| index.lookup(t).is_none()).count(),
            total: p.tracks.len(),
        })
        .collect()
}
