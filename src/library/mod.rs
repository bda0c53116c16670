//! Canonical-key index over the audio files on disk.
//!
//! The index is rebuilt from a full directory scan at the start of every
//! sync, then appended to after each successful download so later tasks see
//! files fetched earlier in the same run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{Error, Result};
use crate::normalize::{CanonicalKey, normalize};
use crate::playlist::TrackRef;
use crate::scanner;

/// One audio file in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub key: CanonicalKey,
}

impl LibraryEntry {
    /// Stat a file and derive its key from the basename without extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().ok(),
            key: key_for_path(path),
        })
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Canonical key of a file: the normalized basename with its extension stripped.
pub fn key_for_path(path: &Path) -> CanonicalKey {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    normalize(&stem)
}

/// Canonical key → file. One entry per key; a later insert replaces an earlier one.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    entries: HashMap<CanonicalKey, LibraryEntry>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-listed paths, in the given order.
    ///
    /// Non-audio paths and files whose name normalizes to an empty key are
    /// skipped. Unreadable files are logged and skipped.
    pub fn build<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut index = Self::new();
        for path in paths {
            let path = path.as_ref();
            if !scanner::is_audio_file(path) {
                continue;
            }
            match LibraryEntry::from_path(path) {
                Ok(entry) => index.insert(entry),
                Err(e) => {
                    debug!(target: "library::index", path = %path.display(), error = %e, "Skipping unreadable file");
                }
            }
        }
        index
    }

    /// Walk `root` and build the index on a blocking thread.
    pub async fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::not_found(root));
        }
        let root = root.to_path_buf();
        let index = tokio::task::spawn_blocking(move || {
            let paths = scanner::walk_audio(&root, &[]);
            Self::build(paths)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        debug!(target: "library::index", entries = index.len(), "Library index built");
        Ok(index)
    }

    fn insert(&mut self, entry: LibraryEntry) {
        if !entry.key.is_matchable() {
            return;
        }
        if let Some(previous) = self.entries.get(&entry.key).filter(|p| p.path != entry.path) {
            debug!(
                target: "library::index",
                key = %entry.key,
                kept = %entry.path.display(),
                replaced = %previous.path.display(),
                "Key collision"
            );
        }
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Record a newly produced file without rescanning.
    pub fn append(&mut self, path: &Path) -> Result<()> {
        let entry = LibraryEntry::from_path(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path),
            _ => Error::Io(e),
        })?;
        self.insert(entry);
        Ok(())
    }

    /// Drop the entry pointing at `path`, if any.
    pub fn remove_path(&mut self, path: &Path) {
        self.entries.retain(|_, e| e.path != path);
    }

    pub fn lookup_key(&self, key: &CanonicalKey) -> Option<&LibraryEntry> {
        if !key.is_matchable() {
            return None;
        }
        self.entries.get(key)
    }

    pub fn lookup(&self, track: &TrackRef) -> Option<&LibraryEntry> {
        self.lookup_key(&track.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LibraryEntry> {
        self.entries.values()
    }
}
