//! Directory traversal for audio files.
//!
//! Traversal order is deterministic (sorted by file name at every level) so
//! that index collisions resolve the same way on every run.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognised as audio, lowercase.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "wav", "webm", "ogg"];

/// Check if a path has an audio file extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether any component below `root` is a dotfile or dot-directory.
fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        })
        .unwrap_or(false)
}

/// Synchronous walk, used where the caller already runs on a blocking thread.
///
/// Hidden files and directories are skipped, as is any directory in `skip_dirs`
/// (matched by name directly under `root`).
pub fn walk_audio(root: &Path, skip_dirs: &[&str]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 1 && e.file_type().is_dir() {
                let name = e.file_name().to_string_lossy();
                return !skip_dirs.iter().any(|d| *d == name);
            }
            true
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !is_hidden(root, e.path()))
        .filter(|e| is_audio_file(e.path()))
        .map(|e| e.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("a/Song.MP3")));
        assert!(is_audio_file(Path::new("clip.webm")));
        assert!(is_audio_file(Path::new("x.m4a")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("lyrics.lrc")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[test]
    fn test_walk_audio_in_sorted_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("b song.mp3")).unwrap();
        File::create(root.join("a music.flac")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("UPPERCASE.OGG")).unwrap();
        File::create(root.join(".hidden.mp3")).unwrap();

        let subdir = root.join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        File::create(subdir.join("track.wav")).unwrap();
        File::create(subdir.join("Artist - Song.lrc")).unwrap();

        let paths = walk_audio(root, &[]);
        let names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();

        assert_eq!(names, vec!["UPPERCASE.OGG", "a music.flac", "b song.mp3", "track.wav"]);
    }

    #[test]
    fn test_walk_audio_skips_named_dirs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        File::create(root.join("keep.mp3")).unwrap();
        std::fs::create_dir(root.join("_Unsorted")).unwrap();
        File::create(root.join("_Unsorted").join("orphan.mp3")).unwrap();

        let paths = walk_audio(root, &["_Unsorted"]);
        assert_eq!(paths, vec![root.join("keep.mp3")]);

        let all = walk_audio(root, &[]);
        assert_eq!(all.len(), 2);
    }
}
