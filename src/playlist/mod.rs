//! Playlist files: parsing, discovery and writing.
//!
//! Two line formats are understood and re-parse to the same track list:
//!
//! - **Simple**: one `Artist - Title` per line; `#` lines are comments.
//! - **Extended**: `#EXTM3U` header (within the first five lines), then
//!   `#EXTINF:-1,<name>` followed by a path line. The track text is the
//!   path's basename without extension.

pub mod source;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{Error, Result, ResultExt};
use crate::normalize::{CanonicalKey, normalize};
use crate::organizer::{sanitize_filename, write_atomic};

pub use source::{FetchedPlaylist, LocalListSource, PlaylistSource, SourceError, refresh_sources};

/// File extensions treated as playlists, lowercase.
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u8", "m3u", "txt"];

const BOM: char = '\u{feff}';

/// One wanted song, exactly as written in a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackRef {
    text: String,
}

impl TrackRef {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn key(&self) -> CanonicalKey {
        normalize(&self.text)
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A named, ordered list of wanted tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDefinition {
    pub name: String,
    /// Identifier of the source this list was fetched from, if any.
    pub source_id: Option<String>,
    pub tracks: Vec<TrackRef>,
    pub last_synced: Option<NaiveDate>,
    pub path: PathBuf,
}

impl PlaylistDefinition {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}

/// Parse playlist text into track references.
pub fn parse_playlist_text(text: &str) -> Vec<TrackRef> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let extended = lines.iter().take(5).any(|l| l.contains("#EXTM3U"));
    if !extended {
        return lines
            .into_iter()
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(TrackRef::new)
            .collect();
    }

    let mut tracks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !lines[i].starts_with("#EXTINF:") {
            i += 1;
            continue;
        }
        // Next non-empty, non-comment line is the path
        let Some(offset) = lines[i + 1..]
            .iter()
            .position(|l| !l.is_empty() && !l.starts_with('#'))
        else {
            break;
        };
        let j = i + 1 + offset;
        let stem = track_name_from_path(lines[j]);
        if !stem.is_empty() {
            tracks.push(TrackRef::new(stem));
        }
        i = j + 1;
    }
    tracks
}

/// Basename without extension, tolerant of both separator styles.
fn track_name_from_path(line: &str) -> String {
    let base = line.rsplit(['/', '\\']).next().unwrap_or(line);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains(' ') => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Read a playlist file. Invalid UTF-8 is decoded lossily.
pub fn read_playlist(path: &Path) -> Result<Vec<TrackRef>> {
    let bytes = std::fs::read(path).with_context(format!("reading playlist {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(target: "playlist::parse", path = %path.display(), "Playlist is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    Ok(parse_playlist_text(&text))
}

pub fn is_playlist_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PLAYLIST_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Playlist display name: the file stem.
pub fn playlist_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List and parse every playlist file in `dir`, sorted by file name.
///
/// Files written by a configured source get that source's id and
/// last-synced date attached. Unreadable files are logged and skipped.
pub fn discover(dir: &Path, sources: &[SourceConfig]) -> Result<Vec<PlaylistDefinition>> {
    if !dir.is_dir() {
        return Err(Error::not_found(dir));
    }

    // Sources write to their sanitized display name
    let by_name: HashMap<String, &SourceConfig> = sources
        .iter()
        .filter_map(|s| s.name.as_deref().map(|n| (sanitize_filename(n), s)))
        .collect();

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(format!("listing playlists in {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_playlist_file(p))
        .collect();
    paths.sort();

    let mut playlists = Vec::with_capacity(paths.len());
    for path in paths {
        let tracks = match read_playlist(&path) {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(target: "playlist::discover", path = %path.display(), error = %e, "Skipping unreadable playlist");
                continue;
            }
        };
        let name = playlist_name(&path);
        let source = by_name.get(&name).copied();
        debug!(target: "playlist::discover", name = %name, tracks = tracks.len(), "Found playlist");
        playlists.push(PlaylistDefinition {
            source_id: source.map(|s| s.id.clone()),
            last_synced: source.and_then(|s| s.last_synced),
            name,
            tracks,
            path,
        });
    }
    Ok(playlists)
}

/// Write one track per line, LF endings.
pub fn write_simple(path: &Path, tracks: &[TrackRef]) -> Result<()> {
    let mut out = String::new();
    for track in tracks {
        out.push_str(track.text());
        out.push('\n');
    }
    write_atomic(path, out.as_bytes()).with_context(format!("writing playlist {}", path.display()))
}

/// Write an extended listing: BOM, `#EXTM3U`, then `#EXTINF:-1,<name>` and
/// the entry's path for each item. CRLF endings.
pub fn write_extended(path: &Path, entries: &[(String, String)]) -> Result<()> {
    let mut out = String::new();
    out.push(BOM);
    out.push_str("#EXTM3U\r\n");
    for (name, location) in entries {
        out.push_str("#EXTINF:-1,");
        out.push_str(name);
        out.push_str("\r\n");
        out.push_str(location);
        out.push_str("\r\n");
    }
    write_atomic(path, out.as_bytes()).with_context(format!("writing playlist {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn texts(tracks: &[TrackRef]) -> Vec<&str> {
        tracks.iter().map(TrackRef::text).collect()
    }

    #[test]
    fn test_parse_simple_format() {
        let tracks = parse_playlist_text("Artist - One\n\n# comment\n  Artist - Two  \n");
        assert_eq!(texts(&tracks), vec!["Artist - One", "Artist - Two"]);
    }

    #[test]
    fn test_parse_extended_format() {
        let text = "\u{feff}#EXTM3U\r\n#EXTINF:-1,Artist - One\r\n../Music/Artist - One.mp3\r\n\
                    #EXTINF:123,Ignored Title\r\n# stray comment\r\n\r\nC:\\Music\\Artist - Two.flac\r\n";
        let tracks = parse_playlist_text(text);
        assert_eq!(texts(&tracks), vec!["Artist - One", "Artist - Two"]);
    }

    #[test]
    fn test_parse_extended_header_must_be_near_top() {
        let text = "a\nb\nc\nd\ne\n#EXTM3U\nf\n";
        assert_eq!(parse_playlist_text(text).len(), 6);
    }

    #[test]
    fn test_extinf_without_path_is_dropped() {
        let text = "#EXTM3U\n#EXTINF:-1,Lonely\n";
        assert!(parse_playlist_text(text).is_empty());
    }

    #[test]
    fn test_track_name_keeps_dots_in_titles() {
        assert_eq!(track_name_from_path("dir/Mr. Brightside.mp3"), "Mr. Brightside");
        assert_eq!(track_name_from_path("G.E.M. - Light Years"), "G.E.M. - Light Years");
    }

    #[test]
    fn test_both_formats_parse_identically() {
        let dir = tempdir().unwrap();
        let tracks = vec![TrackRef::new("Artist - One"), TrackRef::new("劉若英 - 後來")];

        let simple = dir.path().join("simple.m3u");
        write_simple(&simple, &tracks).unwrap();

        let extended = dir.path().join("extended.m3u8");
        let entries: Vec<(String, String)> = tracks
            .iter()
            .map(|t| (t.text().to_string(), format!("../Music/{}.mp3", t.text())))
            .collect();
        write_extended(&extended, &entries).unwrap();

        assert_eq!(read_playlist(&simple).unwrap(), tracks);
        assert_eq!(read_playlist(&extended).unwrap(), tracks);

        let raw = std::fs::read_to_string(&extended).unwrap();
        assert!(raw.starts_with("\u{feff}#EXTM3U\r\n#EXTINF:-1,Artist - One\r\n"));
    }

    #[test]
    fn test_discover_sorted_with_sources() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "X - Y\n").unwrap();
        std::fs::write(dir.path().join("a.m3u8"), "#EXTM3U\n#EXTINF:-1,A - B\nA - B.mp3\n").unwrap();
        std::fs::write(dir.path().join("Road Trip.m3u"), "C - D\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let sources = vec![SourceConfig {
            id: "lists/road.txt".to_string(),
            name: Some("Road Trip".to_string()),
            last_synced: NaiveDate::from_ymd_opt(2026, 1, 2),
        }];

        let playlists = discover(dir.path(), &sources).unwrap();
        let names: Vec<&str> = playlists.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Road Trip", "a", "b"]);

        assert_eq!(playlists[0].source_id.as_deref(), Some("lists/road.txt"));
        assert_eq!(playlists[0].last_synced, NaiveDate::from_ymd_opt(2026, 1, 2));
        assert!(playlists[1].source_id.is_none());
        assert_eq!(texts(&playlists[1].tracks), vec!["A - B"]);
    }

    #[test]
    fn test_lossy_decoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, b"Artist - Ok\n\xff\xfe - Broken\n").unwrap();
        let tracks = read_playlist(&path).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].text(), "Artist - Ok");
    }
}
