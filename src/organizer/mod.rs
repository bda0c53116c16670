//! File naming and movement utilities.
//!
//! # Features
//! - Filename sanitising shared by downloads, snapshots and the tidy pass
//! - Atomic writes for small state files
//! - Moves that fall back to copy + delete across devices
//! - The tidy pass over library filenames
//! - Playlist export to a flat folder per playlist

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::library::LibraryIndex;
use crate::normalize::strip_artifact_prefix;
use crate::playlist::PlaylistDefinition;
use crate::scanner;

/// Sanitizes a filename by replacing characters Windows refuses in names
/// and turning non-breaking spaces into plain ones.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            '\u{a0}' => ' ',
            _ => c,
        })
        .collect()
}

/// Write `bytes` to a temp file next to `path`, then rename over it.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{name}.tmp"));
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

/// Moves a file, creating the destination directory.
pub fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    if let Err(_e) = fs::rename(source, destination) {
        // If rename fails (cross-device), try copy + delete
        fs::copy(source, destination)
            .with_context(|| format!("Failed to copy file to: {:?}", destination))?;
        fs::remove_file(source)
            .with_context(|| format!("Failed to remove source file: {:?}", source))?;
    }
    Ok(())
}

/// Name a file should have after tidying, if different.
fn tidy_name(file_name: &str) -> Option<String> {
    let stripped = strip_artifact_prefix(file_name);
    let (stem, ext) = match stripped.rfind('.') {
        Some(dot) if dot > 0 => stripped.split_at(dot),
        _ => (stripped, ""),
    };
    let tidy = format!("{}{}", sanitize_filename(stem), ext);
    (tidy != file_name).then_some(tidy)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TidySummary {
    pub renamed: usize,
    /// Artifact copies deleted because the clean name already existed
    pub removed: usize,
}

/// Fix artifact-prefixed and unsafe audio filenames under `library`.
///
/// When the clean name is already taken, the artifact copy is deleted.
pub fn tidy_filenames(library: &Path) -> Result<TidySummary> {
    let mut summary = TidySummary::default();
    if !library.is_dir() {
        return Ok(summary);
    }

    for path in scanner::walk_audio(library, &[]) {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(new_name) = tidy_name(&file_name) else {
            continue;
        };
        let target = path.with_file_name(&new_name);

        if target.exists() {
            fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
            debug!(target: "organizer::tidy", removed = %path.display(), kept = %target.display(), "Removed artifact copy");
            summary.removed += 1;
        } else {
            fs::rename(&path, &target).with_context(|| format!("Failed to rename {:?}", path))?;
            debug!(target: "organizer::tidy", from = %file_name, to = %new_name, "Renamed");
            summary.renamed += 1;
        }
    }

    if summary.renamed + summary.removed > 0 {
        info!(target: "organizer::tidy", renamed = summary.renamed, removed = summary.removed, "Tidied library filenames");
    }
    Ok(summary)
}

/// Per-playlist export result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPlaylist {
    pub playlist: String,
    pub copied: usize,
    pub total: usize,
}

/// Recreate `export_path` and copy each selected playlist's matched files
/// into `export_path/<playlist name>/`.
///
/// An empty `selected` exports every playlist.
pub fn export_playlists(
    playlists: &[PlaylistDefinition],
    index: &LibraryIndex,
    export_path: &Path,
    selected: &[String],
) -> Result<Vec<ExportedPlaylist>> {
    if export_path.exists() {
        fs::remove_dir_all(export_path)
            .with_context(|| format!("Failed to clear export directory: {:?}", export_path))?;
    }
    fs::create_dir_all(export_path)
        .with_context(|| format!("Failed to create export directory: {:?}", export_path))?;

    let mut results = Vec::new();
    for playlist in playlists
        .iter()
        .filter(|p| selected.is_empty() || selected.iter().any(|s| s == &p.name))
    {
        let folder: PathBuf = export_path.join(sanitize_filename(&playlist.name));
        fs::create_dir_all(&folder)
            .with_context(|| format!("Failed to create directory: {:?}", folder))?;

        let mut copied = 0;
        for track in &playlist.tracks {
            let Some(entry) = index.lookup(track) else {
                continue;
            };
            let dest = folder.join(entry.file_name());
            match fs::copy(&entry.path, &dest) {
                Ok(_) => copied += 1,
                Err(e) => warn!(target: "organizer::export", path = %entry.path.display(), error = %e, "Copy failed"),
            }
        }

        info!(target: "organizer::export", playlist = %playlist.name, copied, total = playlist.len(), "Exported playlist");
        results.push(ExportedPlaylist {
            playlist: playlist.name.clone(),
            copied,
            total: playlist.len(),
        });
    }
    Ok(results)
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Generate valid filename characters (excluding path separators and invalid chars)
    fn valid_filename_char() -> impl Strategy<Value = char> {
        prop::char::range('!', '~').prop_filter("no invalid chars", |c| {
            !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        })
    }

    /// Generate a valid filename string
    fn valid_filename() -> impl Strategy<Value = String> {
        prop::collection::vec(valid_filename_char(), 1..50)
            .prop_map(|chars| chars.into_iter().collect())
    }

    /// Generate an arbitrary string that might contain invalid characters
    fn arbitrary_filename() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9 /:*?\"<>|_-]{1,50}")
            .unwrap()
            .prop_filter("non-empty", |s| !s.is_empty())
    }

    proptest! {
        /// Sanitized filenames should never contain path separators
        #[test]
        fn sanitize_removes_path_separators(input in arbitrary_filename()) {
            let sanitized = sanitize_filename(&input);
            prop_assert!(!sanitized.contains('/'), "Found / in: {}", sanitized);
            prop_assert!(!sanitized.contains('\\'), "Found \\ in: {}", sanitized);
        }

        /// Sanitized filenames should never contain Windows-invalid characters
        #[test]
        fn sanitize_removes_invalid_chars(input in arbitrary_filename()) {
            let sanitized = sanitize_filename(&input);
            for c in [':', '*', '?', '"', '<', '>', '|'] {
                prop_assert!(!sanitized.contains(c), "Found {} in: {}", c, sanitized);
            }
        }

        /// Sanitized filename length should be same as input length
        #[test]
        fn sanitize_preserves_length(input in arbitrary_filename()) {
            let sanitized = sanitize_filename(&input);
            prop_assert_eq!(input.chars().count(), sanitized.chars().count());
        }

        /// Valid filenames should pass through unchanged
        #[test]
        fn sanitize_preserves_valid_names(input in valid_filename()) {
            let sanitized = sanitize_filename(&input);
            prop_assert_eq!(input, sanitized);
        }
    }
}
