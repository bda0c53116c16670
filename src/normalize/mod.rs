//! Canonical keys for track titles.
//!
//! Two track titles refer to the same song iff their [`CanonicalKey`]s are
//! equal. The key is an order-independent, script-folded,
//! punctuation-stripped multiset of tokens:
//!
//! 1. Strip the `E` tagging artifact (`"EYosebe"` → `"Yosebe"`)
//! 2. Lowercase
//! 3. Fold Traditional Chinese ideographs to Simplified (kana untouched)
//! 4. Collapse separators (`feat.`, `ft.`, `vs`, `&`, `,`, lone `x`)
//! 5. Drop bracketed annotations with their contents
//! 6. Replace everything outside `a-z0-9`, CJK ideographs and kana with spaces
//! 7. Split, drop empties, sort
//!
//! Matching is exact after normalization; there is no edit distance.
//! An empty key is unmatchable and never equals another empty key in lookups.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use zhconv::{Variant, zhconv};

/// Token storage; most titles fit inline.
pub type Tokens = SmallVec<[String; 6]>;

static CJK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]+").unwrap());

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:feat|ft|vs)\b\.?|[&,]|\bx\b").unwrap());

/// Separator words that can still surface as lone tokens once punctuation
/// glued to them (`"_x"`, `"é&feat"`) is blanked out.
const SEPARATOR_WORDS: &[&str] = &["feat", "ft", "vs", "x"];

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[(\[【（][^)\]】）]*[)\]】）]").unwrap());

static NON_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9\u{4e00}-\u{9fff}\u{3040}-\u{309f}\u{30a0}-\u{30ff}]+").unwrap()
});

/// Order-independent identity of a song title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey(Tokens);

impl CanonicalKey {
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empty keys never match anything.
    pub fn is_matchable(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(" "))
    }
}

/// Compute the canonical key for a raw title. Pure and deterministic.
pub fn normalize(text: &str) -> CanonicalKey {
    let text = strip_artifact_prefix(text.trim_start());
    let text = text.to_lowercase();
    let text = fold_script(&text);
    let text = SEPARATORS.replace_all(&text, " ");
    let text = BRACKETED.replace_all(&text, " ");
    let text = NON_TOKEN.replace_all(&text, " ");

    let mut tokens: Tokens = text
        .split_whitespace()
        .filter(|t| !SEPARATOR_WORDS.contains(t))
        .map(str::to_string)
        .collect();
    tokens.sort();
    CanonicalKey(tokens)
}

/// Remove a leading `E` when it is immediately followed by an uppercase
/// letter, a CJK ideograph or kana. Case-sensitive: `"Eason"` is kept.
pub fn strip_artifact_prefix(text: &str) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('E'), Some(next)) if next.is_uppercase() || is_script_letter(next) => &text[1..],
        _ => text,
    }
}

/// Fold runs of CJK ideographs to Simplified script, leaving kana alone.
fn fold_script(text: &str) -> String {
    CJK_RUN
        .replace_all(text, |caps: &regex::Captures| zhconv(&caps[0], Variant::ZhCN))
        .into_owned()
}

fn is_script_letter(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3040}'..='\u{30ff}')
}
