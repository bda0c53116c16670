//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\playlist-keeper\config.toml
//! - macOS: ~/Library/Application Support/playlist-keeper/config.toml
//! - Linux: ~/.config/playlist-keeper/config.toml
//!
//! `--config <path>` points at a different file. The sync run rewrites the
//! file when a playlist source is refreshed (display name, last-synced date).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::download::AudioFormat;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory layout and target format
    pub library: LibraryConfig,

    /// Fetch tool and pacing
    pub download: DownloadConfig,

    /// Synced-lyrics lookups
    pub lyrics: LyricsConfig,

    /// Playlist sources, refreshed at the start of each sync
    pub sources: Vec<SourceConfig>,
}

/// Library layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Where audio files live
    pub library_path: PathBuf,

    /// Where playlist files live
    pub playlists_path: PathBuf,

    /// Destination for `export`
    pub export_path: PathBuf,

    /// Caches and other persisted state
    pub data_path: PathBuf,

    /// Target format for downloads
    pub audio_format: AudioFormat,

    /// Quarantine folder name, inside `library_path`
    pub quarantine_dir: String,

    /// Quarantine listing name, inside `playlists_path`
    pub quarantine_playlist: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("./Library"),
            playlists_path: PathBuf::from("./Playlists"),
            export_path: PathBuf::from("./Export"),
            data_path: default_data_dir(),
            audio_format: AudioFormat::Mp3,
            quarantine_dir: "_Unsorted".to_string(),
            quarantine_playlist: "_Unsorted".to_string(),
        }
    }
}

impl LibraryConfig {
    pub fn quarantine_path(&self) -> PathBuf {
        self.library_path.join(&self.quarantine_dir)
    }

    pub fn quarantine_listing_path(&self) -> PathBuf {
        self.playlists_path
            .join(format!("{}.m3u8", self.quarantine_playlist))
    }

    pub fn lyrics_cache_path(&self) -> PathBuf {
        self.data_path.join("failed_lyrics.json")
    }
}

/// Download pacing and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Executable used to search and fetch audio
    pub fetch_tool: String,

    /// Netscape cookie file handed to the fetch tool
    pub cookies_file: Option<PathBuf>,

    /// Attempts per candidate query before moving on
    pub attempts_per_candidate: u32,

    /// Random pause between tasks, in seconds
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,

    /// Extended pause after this many successes (0 disables)
    pub cooldown_every: u32,
    pub cooldown_secs: u64,

    /// Pause after an access-forbidden response
    pub forbidden_delay_ms: u64,

    /// Titles longer than this get a shortened candidate
    pub long_title_chars: usize,

    /// Word count of the shortened candidate
    pub short_title_words: usize,

    /// Per-task ETA before any task has finished
    pub fallback_eta_secs: u64,

    /// Progress throttle: at most one update per interval...
    pub progress_interval_ms: u64,

    /// ...unless the percentage moved at least this much
    pub progress_percent_step: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            fetch_tool: "yt-dlp".to_string(),
            cookies_file: None,
            attempts_per_candidate: 2,
            jitter_min_secs: 3.0,
            jitter_max_secs: 8.0,
            cooldown_every: 10,
            cooldown_secs: 15,
            forbidden_delay_ms: 1000,
            long_title_chars: 50,
            short_title_words: 4,
            fallback_eta_secs: 120,
            progress_interval_ms: 2000,
            progress_percent_step: 10.0,
        }
    }
}

impl DownloadConfig {
    pub fn forbidden_delay(&self) -> Duration {
        Duration::from_millis(self.forbidden_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn fallback_eta(&self) -> Duration {
        Duration::from_secs(self.fallback_eta_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Synced-lyrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    /// Fetch lyrics after each download
    pub enabled: bool,

    /// Look up lyrics for existing files that have none
    pub backfill: bool,

    /// Backfill worker count
    pub max_workers: usize,

    /// Ignore the failure cache
    pub retry_failed: bool,

    /// Stop backfill after this many failures in a row
    pub max_consecutive_failures: usize,

    /// Rounds over the query variants per lookup
    pub max_attempts: u32,

    /// Convert lyric text to this script variant (e.g. "zh-tw")
    pub script: Option<String>,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backfill: true,
            max_workers: 4,
            retry_failed: false,
            max_consecutive_failures: 10,
            max_attempts: 3,
            script: None,
        }
    }
}

/// One playlist source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Opaque identifier understood by the source collaborator
    pub id: String,

    /// Display name from the last refresh
    #[serde(default)]
    pub name: Option<String>,

    /// Local date of the last successful refresh
    #[serde(default)]
    pub last_synced: Option<NaiveDate>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            last_synced: None,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playlist-keeper"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("playlist-keeper"))
        .unwrap_or_else(|| PathBuf::from(".playlist-keeper"))
}

/// Load configuration from `path`
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::debug!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
