//! Synced lyrics (`.lrc`) lookups.
//!
//! - [`lrclib`] is the real caption source
//! - [`cache`] remembers songs no source had lyrics for
//! - [`backfill`] looks up lyrics for existing files on a small worker pool
//!
//! A lookup tries a couple of cleaned query variants per round and retries
//! whole rounds only on network errors.

pub mod backfill;
pub mod cache;
pub mod lrclib;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use tracing::{debug, warn};
use zhconv::Variant;

use crate::config::LyricsConfig;
use crate::control::{Cancelled, SyncControl};

pub use backfill::{BackfillSummary, backfill, missing_lyrics};
pub use cache::FailureCache;
pub use lrclib::LrclibClient;

/// Caption lookup errors
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    /// Network error (connection, timeout, server-side failure)
    #[error("Network error: {0}")]
    Network(String),

    /// Service answered with an error
    #[error("API error: {0}")]
    Api(String),

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

impl CaptionError {
    /// Whether another round might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Trait for caption sources.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait CaptionFetcher: Send + Sync {
    /// Search for lyrics. Synced text is preferred; plain text is acceptable.
    async fn search(&self, query: &str) -> Result<Option<String>, CaptionError>;
}

/// Per-item state shown while lyrics are being looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LyricsStatus {
    Waiting,
    Searching,
    Found,
    Failed,
}

/// Result of one lookup.
#[derive(Debug)]
pub enum CaptionOutcome {
    Found(String),
    NotFound,
    Failed(CaptionError),
}

/// Knobs for [`fetch_captions`].
#[derive(Debug, Clone)]
pub struct CaptionOptions {
    /// Rounds over the query variants
    pub max_attempts: u32,
    /// Pause between two queries of one round
    pub query_delay: Duration,
    /// Backoff before round `n` is `unit * 2^n + unit * rand(1..=3)`
    pub backoff_unit: Duration,
    /// Script variant the text is converted to before writing
    pub script: Option<Variant>,
}

impl Default for CaptionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            query_delay: Duration::from_millis(500),
            backoff_unit: Duration::from_secs(1),
            script: None,
        }
    }
}

impl From<&LyricsConfig> for CaptionOptions {
    fn from(config: &LyricsConfig) -> Self {
        let script = config.script.as_deref().and_then(|s| {
            let variant = parse_script(s);
            if variant.is_none() {
                warn!(target: "lyrics", script = s, "Unknown script variant, lyrics left as-is");
            }
            variant
        });
        Self {
            max_attempts: config.max_attempts.max(1),
            script,
            ..Self::default()
        }
    }
}

impl CaptionOptions {
    fn backoff(&self, round: u32) -> Duration {
        let jitter = rand::rng().random_range(1..=3);
        self.backoff_unit * 2u32.saturating_pow(round) + self.backoff_unit * jitter
    }
}

/// Map a script tag such as `zh-tw` to a conversion target.
pub fn parse_script(tag: &str) -> Option<Variant> {
    match tag.trim().to_lowercase().replace('_', "-").as_str() {
        "zh-hant" => Some(Variant::ZhHant),
        "zh-hans" => Some(Variant::ZhHans),
        "zh-tw" => Some(Variant::ZhTW),
        "zh-hk" => Some(Variant::ZhHK),
        "zh-mo" => Some(Variant::ZhMO),
        "zh-cn" => Some(Variant::ZhCN),
        "zh-sg" => Some(Variant::ZhSG),
        "zh-my" => Some(Variant::ZhMY),
        _ => None,
    }
}

static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*\(.*?\)|\s*\[.*?\]|\s*【.*?】|\s*-?\s*\b(?:official\s*video|music\s*video|tv\s*version|mv|lyrics|hd|4k)\b",
    )
    .unwrap()
});

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Drop bracketed annotations and video-title noise.
pub fn clean_caption_query(song: &str) -> String {
    let cleaned = NOISE.replace_all(song, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Query variants for one song, most specific first.
pub fn caption_queries(song: &str) -> Vec<String> {
    let cleaned = clean_caption_query(song);
    if cleaned.is_empty() {
        return Vec::new();
    }
    let alternative = NON_WORD
        .replace_all(&cleaned, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut queries = vec![cleaned];
    if !alternative.is_empty() && alternative != queries[0] {
        queries.push(alternative);
    }
    queries
}

/// Look up lyrics for `song`.
///
/// Not-found and non-network errors end the lookup at once; network errors
/// back off and start another round while rounds remain.
pub async fn fetch_captions(
    fetcher: &dyn CaptionFetcher,
    song: &str,
    options: &CaptionOptions,
    control: &SyncControl,
) -> Result<CaptionOutcome, Cancelled> {
    let queries = caption_queries(song);
    let mut last_error = None;

    for round in 0..options.max_attempts.max(1) {
        if round > 0 {
            control.sleep(options.backoff(round)).await?;
        }

        let mut network_failed = false;
        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                control.sleep(options.query_delay).await?;
            }
            control.checkpoint().await?;

            match fetcher.search(query).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    debug!(target: "lyrics", song, query, "Lyrics found");
                    return Ok(CaptionOutcome::Found(text));
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    debug!(target: "lyrics", song, round, error = %e, "Lyrics lookup failed, will retry");
                    last_error = Some(e);
                    network_failed = true;
                    break;
                }
                Err(e) => return Ok(CaptionOutcome::Failed(e)),
            }
        }

        if !network_failed {
            return Ok(CaptionOutcome::NotFound);
        }
    }

    Ok(last_error.map_or(CaptionOutcome::NotFound, CaptionOutcome::Failed))
}

/// Sibling `.lrc` path for an audio file.
pub fn lrc_path_for(audio: &Path) -> PathBuf {
    audio.with_extension("lrc")
}

/// Write lyrics next to `audio`, converting the script first if asked.
pub fn write_captions(audio: &Path, text: &str, script: Option<Variant>) -> std::io::Result<PathBuf> {
    let path = lrc_path_for(audio);
    let text = match script {
        Some(variant) => zhconv::zhconv(text, variant),
        None => text.to_string(),
    };
    crate::organizer::write_atomic(&path, text.as_bytes())?;
    Ok(path)
}
