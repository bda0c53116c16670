//! Quarantine for library files no playlist wants any more.
//!
//! Each run first moves quarantined files that became wanted again back to
//! the library root, then moves unwanted library files into quarantine, then
//! regenerates the quarantine listing from what is actually in the folder.
//! A file whose name is already taken at the destination is deleted instead
//! of overwriting the existing one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::control::SyncControl;
use crate::error::{Result, ResultExt};
use crate::library::{LibraryIndex, key_for_path};
use crate::normalize::CanonicalKey;
use crate::organizer::move_file;
use crate::playlist::{PlaylistDefinition, write_extended};
use crate::scanner;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Orphans moved into quarantine
    pub moved: usize,
    /// Files deleted because the destination already had one by that name
    pub duplicates_removed: usize,
    /// Quarantined files moved back to the library
    pub recovered: usize,
    /// Entries in the regenerated quarantine listing
    pub listed: usize,
}

impl ReconcileSummary {
    pub fn changed_files(&self) -> usize {
        self.moved + self.duplicates_removed + self.recovered
    }
}

/// Moves orphans in and out of the quarantine folder.
pub struct UnsortedReconciler<'a> {
    library: PathBuf,
    quarantine_dir: String,
    quarantine_playlist: String,
    playlists_dir: PathBuf,
    control: &'a SyncControl,
}

impl<'a> UnsortedReconciler<'a> {
    pub fn new(config: &LibraryConfig, control: &'a SyncControl) -> Self {
        Self {
            library: config.library_path.clone(),
            quarantine_dir: config.quarantine_dir.clone(),
            quarantine_playlist: config.quarantine_playlist.clone(),
            playlists_dir: config.playlists_path.clone(),
            control,
        }
    }

    fn quarantine(&self) -> PathBuf {
        self.library.join(&self.quarantine_dir)
    }

    fn listing_path(&self) -> PathBuf {
        self.playlists_dir
            .join(format!("{}.m3u8", self.quarantine_playlist))
    }

    /// Keys referenced by every playlist except the quarantine listing.
    fn wanted_keys(&self, playlists: &[PlaylistDefinition]) -> HashSet<CanonicalKey> {
        playlists
            .iter()
            .filter(|p| p.name != self.quarantine_playlist)
            .flat_map(|p| p.tracks.iter().map(|t| t.key()))
            .filter(CanonicalKey::is_matchable)
            .collect()
    }

    /// Run recovery, quarantine and listing regeneration.
    ///
    /// `index` is kept in step with every move. Individual file failures
    /// are logged and skipped; only cancellation and a failed listing write
    /// are errors.
    pub fn reconcile(
        &self,
        playlists: &[PlaylistDefinition],
        index: &mut LibraryIndex,
    ) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let wanted = self.wanted_keys(playlists);
        let quarantine = self.quarantine();

        if quarantine.is_dir() {
            for path in quarantined_files(&quarantine) {
                if !wanted.contains(&key_for_path(&path)) {
                    continue;
                }
                self.control.check()?;
                match relocate(&path, &self.library, index) {
                    Ok(Relocated::Moved) => summary.recovered += 1,
                    Ok(Relocated::DuplicateRemoved) => summary.duplicates_removed += 1,
                    Err(e) => warn!(target: "sync::reconcile", path = %path.display(), error = %e, "Could not recover file"),
                }
            }
        }

        if self.library.is_dir() {
            let skip = [self.quarantine_dir.as_str()];
            for path in scanner::walk_audio(&self.library, &skip) {
                if wanted.contains(&key_for_path(&path)) {
                    continue;
                }
                self.control.check()?;
                match relocate(&path, &quarantine, index) {
                    Ok(Relocated::Moved) => summary.moved += 1,
                    Ok(Relocated::DuplicateRemoved) => summary.duplicates_removed += 1,
                    Err(e) => warn!(target: "sync::reconcile", path = %path.display(), error = %e, "Could not quarantine file"),
                }
            }
        }

        self.control.check()?;
        summary.listed = self.write_listing(&quarantine)?;

        info!(
            target: "sync::reconcile",
            moved = summary.moved,
            recovered = summary.recovered,
            duplicates_removed = summary.duplicates_removed,
            listed = summary.listed,
            "Quarantine reconciled"
        );
        Ok(summary)
    }

    /// Rewrite the quarantine listing from the folder's contents, or remove
    /// it when the folder holds no audio.
    fn write_listing(&self, quarantine: &Path) -> Result<usize> {
        let files = if quarantine.is_dir() {
            quarantined_files(quarantine)
        } else {
            Vec::new()
        };
        let listing = self.listing_path();

        if files.is_empty() {
            if listing.exists() {
                std::fs::remove_file(&listing)
                    .with_context(format!("removing {}", listing.display()))?;
                debug!(target: "sync::reconcile", "Removed empty quarantine listing");
            }
            return Ok(0);
        }

        std::fs::create_dir_all(&self.playlists_dir)
            .with_context(format!("creating {}", self.playlists_dir.display()))?;
        let entries: Vec<(String, String)> = files
            .iter()
            .map(|f| {
                let name = f
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (name, relative_location(&self.playlists_dir, f))
            })
            .collect();
        write_extended(&listing, &entries)?;
        Ok(entries.len())
    }
}

enum Relocated {
    Moved,
    DuplicateRemoved,
}

/// Move `path` into `dir`, or delete it if `dir` already has that name.
fn relocate(path: &Path, dir: &Path, index: &mut LibraryIndex) -> anyhow::Result<Relocated> {
    let Some(name) = path.file_name() else {
        anyhow::bail!("no file name");
    };
    let dest = dir.join(name);
    if dest == path {
        anyhow::bail!("already in place");
    }

    index.remove_path(path);
    if dest.exists() {
        std::fs::remove_file(path)?;
        debug!(target: "sync::reconcile", removed = %path.display(), kept = %dest.display(), "Duplicate removed");
        reindex(index, &dest);
        return Ok(Relocated::DuplicateRemoved);
    }

    move_file(path, &dest)?;
    debug!(target: "sync::reconcile", from = %path.display(), to = %dest.display(), "Moved");
    reindex(index, &dest);
    Ok(Relocated::Moved)
}

/// Index a file at its new location. Returns false, logged, when it cannot be read.
fn reindex(index: &mut LibraryIndex, dest: &Path) -> bool {
    match index.append(dest) {
        Ok(()) => true,
        Err(e) => {
            warn!(target: "sync::reconcile", path = %dest.display(), error = %e, "Moved file not indexed");
            false
        }
    }
}

/// Audio files directly inside the quarantine folder, sorted.
fn quarantined_files(quarantine: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(quarantine) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && scanner::is_audio_file(p))
        .filter(|p| !p.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.')))
        .collect();
    files.sort();
    files
}

/// `target` relative to `from_dir`, with `/` separators. Falls back to the
/// absolute path when the two share no root.
fn relative_location(from_dir: &Path, target: &Path) -> String {
    let from = std::path::absolute(from_dir).unwrap_or_else(|_| from_dir.to_path_buf());
    let to = std::path::absolute(target).unwrap_or_else(|_| target.to_path_buf());

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return to.to_string_lossy().into_owned();
    }

    let mut parts: Vec<String> = vec!["..".to_string(); from_parts.len() - common];
    parts.extend(
        to_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
