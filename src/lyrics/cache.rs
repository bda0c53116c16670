//! Persistent record of songs with no lyrics anywhere.
//!
//! Stored as a JSON object keyed by the SHA-256 of the song name. Every
//! mutation is written through immediately (temp file + rename) under the
//! cache's own lock, so concurrent workers never interleave a
//! read-modify-write and an interruption loses at most the lookup in flight.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// One cached failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub name: String,
    /// Unix seconds
    pub timestamp: i64,
    pub reason: String,
}

/// Shared failure cache.
#[derive(Debug)]
pub struct FailureCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, FailureEntry>>,
}

/// Cache key for a song name.
pub fn cache_key(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

impl FailureCache {
    /// Load the cache from `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(target: "lyrics::cache", path = %path.display(), error = %e, "Corrupt lyrics cache, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        debug!(target: "lyrics::cache", entries = entries.len(), "Loaded lyrics failure cache");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(&cache_key(name))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a failure and persist it.
    pub fn record(&self, name: &str, reason: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            cache_key(name),
            FailureEntry {
                name: name.to_string(),
                timestamp: Utc::now().timestamp(),
                reason: reason.to_string(),
            },
        );
        self.persist(&entries)
    }

    /// Forget a failure (lyrics showed up after all) and persist.
    pub fn forget(&self, name: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(&cache_key(name)).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    fn persist(&self, entries: &BTreeMap<String, FailureEntry>) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(entries).map_err(std::io::Error::other)?;
        crate::organizer::write_atomic(&self.path, &json)
    }
}
