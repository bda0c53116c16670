//! Library size and playlist deduplication statistics.
//!
//! Savings model: a track that appears in `n` playlist entries exists once
//! on disk, so it saves `(n - 1) * size` compared to a copy per entry.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local};

use crate::library::LibraryIndex;
use crate::normalize::CanonicalKey;
use crate::playlist::PlaylistDefinition;

/// How many recently modified files to report.
const RECENT_COUNT: usize = 5;

/// A recently modified library file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentFile {
    pub name: String,
    /// Local date, `YYYY-MM-DD`
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub recent: Vec<RecentFile>,
    /// Entries across all playlists
    pub total_entries: usize,
    /// Distinct entry texts across all playlists
    pub unique_entries: usize,
    /// `total_entries - unique_entries`
    pub duplicates: usize,
    pub savings_bytes: u64,
}

impl LibraryStats {
    /// Size the library would need with one file per playlist entry.
    pub fn potential_bytes(&self) -> u64 {
        self.total_bytes + self.savings_bytes
    }
}

pub fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Compute statistics from the index and every playlist.
pub fn compute(index: &LibraryIndex, playlists: &[PlaylistDefinition]) -> LibraryStats {
    let total_files = index.len();
    let total_bytes = index.entries().map(|e| e.size).sum();

    let mut by_age: Vec<_> = index.entries().filter(|e| e.modified.is_some()).collect();
    by_age.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
    let recent = by_age
        .into_iter()
        .take(RECENT_COUNT)
        .filter_map(|e| {
            let modified: DateTime<Local> = e.modified?.into();
            Some(RecentFile {
                name: e.file_name(),
                date: modified.format("%Y-%m-%d").to_string(),
            })
        })
        .collect();

    let all_tracks = playlists.iter().flat_map(|p| p.tracks.iter());
    let total_entries = playlists.iter().map(|p| p.tracks.len()).sum::<usize>();
    let unique_entries = all_tracks
        .clone()
        .map(|t| t.text())
        .collect::<HashSet<_>>()
        .len();

    let mut occurrences: HashMap<CanonicalKey, u64> = HashMap::new();
    for track in all_tracks {
        let key = track.key();
        if key.is_matchable() {
            *occurrences.entry(key).or_default() += 1;
        }
    }
    let savings_bytes = occurrences
        .iter()
        .filter(|(_, count)| **count > 1)
        .filter_map(|(key, count)| index.lookup_key(key).map(|e| (count - 1) * e.size))
        .sum();

    LibraryStats {
        total_files,
        total_bytes,
        recent,
        total_entries,
        unique_entries,
        duplicates: total_entries - unique_entries,
        savings_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::TrackRef;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn playlist(name: &str, tracks: &[&str]) -> PlaylistDefinition {
        PlaylistDefinition {
            name: name.to_string(),
            source_id: None,
            tracks: tracks.iter().map(|t| TrackRef::new(*t)).collect(),
            last_synced: None,
            path: PathBuf::from(format!("{name}.m3u")),
        }
    }

    #[test]
    fn test_savings_count_repeated_keys() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("A - One.mp3");
        let b = dir.path().join("B - Two.mp3");
        std::fs::write(&a, vec![0u8; 100]).unwrap();
        std::fs::write(&b, vec![0u8; 40]).unwrap();
        let index = LibraryIndex::build([a, b]);

        let playlists = [
            playlist("First", &["A - One", "B - Two", "Missing - Song"]),
            playlist("Second", &["One - A", "A - One"]),
            playlist("Third", &["A - One", "Missing - Song"]),
        ];
        let stats = compute(&index, &playlists);

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_bytes, 140);
        assert_eq!(stats.total_entries, 7);
        // "A - One", "B - Two", "Missing - Song", "One - A"
        assert_eq!(stats.unique_entries, 4);
        assert_eq!(stats.duplicates, 3);
        // Key [a, one] appears 4 times; missing files save nothing
        assert_eq!(stats.savings_bytes, 300);
        assert_eq!(stats.potential_bytes(), 440);
    }

    #[test]
    fn test_recent_files_are_newest_first() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..7 {
            let p = dir.path().join(format!("Song {i}.mp3"));
            std::fs::write(&p, b"x").unwrap();
            let file = std::fs::File::options().write(true).open(&p).unwrap();
            let when = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000 + i * 86_400);
            file.set_modified(when).unwrap();
            paths.push(p);
        }
        let stats = compute(&LibraryIndex::build(paths), &[]);

        assert_eq!(stats.recent.len(), 5);
        assert_eq!(stats.recent[0].name, "Song 6.mp3");
        assert_eq!(stats.recent[4].name, "Song 2.mp3");
        assert_eq!(stats.recent[0].date.len(), 10);
    }

    #[test]
    fn test_empty_inputs() {
        let stats = compute(&LibraryIndex::new(), &[]);
        assert_eq!(stats, LibraryStats::default());
        assert_eq!(mib(1024 * 1024), 1.0);
    }
}
