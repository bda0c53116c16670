//! Ranked search queries for one wanted track.
//!
//! Order runs from most-likely-correct to most desperate. The list is a pure
//! function of the raw text and the options; duplicates and empties are
//! dropped while keeping first-seen order.

use once_cell::sync::Lazy;
use regex::Regex;

/// Artist names that collide with common words or other acts; queries
/// mentioning them get a disambiguating suffix.
const HIGH_COLLISION_ARTISTS: &[&str] = &[
    "twice",
    "blackpink",
    "bts",
    "seventeen",
    "ive",
    "nct",
    "stray",
    "enhypen",
    "ateez",
    "lisa",
    "newjeans",
    "tomorrow x together",
];

/// Substrings that search poorly on their own, with the literal queries to use.
const OVERRIDES: &[(&str, &[&str])] = &[
    ("BOUNCY", &["ATEEZ BOUNCY", "ATEEZ BOUNCY official mv"]),
    ("HOT CHILLI PEPPERS", &["ATEEZ HOT CHILLI PEPPERS"]),
];

const LOCALIZATION_MARKER: &str = "Japanese Ver.";
const LOCALIZED_SUFFIXES: &[&str] = &[" japanese version", " jp ver"];

static ARTIST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternatives: Vec<String> = HIGH_COLLISION_ARTISTS.iter().map(|a| regex::escape(a)).collect();
    Regex::new(&format!(r"\b(?:{})\b", alternatives.join("|"))).unwrap()
});

static PARENTHESES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());

static SPECIAL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-]").unwrap());

/// Knobs for candidate generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateOptions {
    /// Titles longer than this (in chars) get a shortened variant
    pub long_title_chars: usize,
    /// Words kept by the shortened variant
    pub short_title_words: usize,
}

impl Default for CandidateOptions {
    fn default() -> Self {
        Self {
            long_title_chars: 50,
            short_title_words: 4,
        }
    }
}

impl From<&crate::config::DownloadConfig> for CandidateOptions {
    fn from(config: &crate::config::DownloadConfig) -> Self {
        Self {
            long_title_chars: config.long_title_chars,
            short_title_words: config.short_title_words,
        }
    }
}

/// Commas and non-breaking spaces become spaces; whitespace collapses.
fn clean(text: &str) -> String {
    text.replace([',', '\u{a0}'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct Ranked(Vec<String>);

impl Ranked {
    fn push(&mut self, query: impl Into<String>) {
        let query = query.into();
        if !query.is_empty() && !self.0.contains(&query) {
            self.0.push(query);
        }
    }
}

/// Generate the ordered candidate list for `raw`.
pub fn generate(raw: &str, options: &CandidateOptions) -> Vec<String> {
    let mut out = Ranked::default();
    let base = clean(raw);
    if base.is_empty() {
        return Vec::new();
    }
    out.push(base.clone());

    if base.contains(" - ") {
        out.push(base.replace(" - ", " "));
    }

    if let Some((artist, title)) = raw.split_once(" - ") {
        out.push(clean(&format!("{artist} {title}")));
    }

    // Title only: may match an unrelated song, so it stays behind the above
    if let Some((_, title)) = raw.rsplit_once(" - ") {
        out.push(clean(title));
    }

    if ARTIST_PATTERN.is_match(&base.to_lowercase()) {
        out.push(format!("{base} official mv"));
        out.push(format!("{base} music video"));
    }

    if base.contains('(') && base.contains(')') {
        let stripped = PARENTHESES.replace_all(&base, "").trim().to_string();
        if !stripped.is_empty() {
            out.push(stripped.clone());
            out.push(format!("{stripped} official mv"));
        }
    }

    let simplified = SPECIAL_CHARS.replace_all(&base, " ");
    let simplified = clean(&simplified);
    if simplified != base {
        out.push(simplified);
    }

    if base.chars().count() > options.long_title_chars {
        let words: Vec<&str> = base.split_whitespace().collect();
        if words.len() > options.short_title_words {
            out.push(words[..options.short_title_words].join(" "));
        }
    }

    for (needle, queries) in OVERRIDES {
        if base.contains(needle) {
            for query in *queries {
                out.push(*query);
            }
        }
    }

    if base.contains(LOCALIZATION_MARKER) {
        let plain = clean(&base.replace(LOCALIZATION_MARKER, ""));
        if !plain.is_empty() {
            out.push(plain.clone());
            for suffix in LOCALIZED_SUFFIXES {
                out.push(format!("{plain}{suffix}"));
            }
        }
    }

    out.0
}
