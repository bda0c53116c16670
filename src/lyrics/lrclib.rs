//! LRCLIB HTTP client
//!
//! See: https://lrclib.net/docs
//!
//! Search results are ordered by relevance; the first track with synced
//! lyrics wins, otherwise the first with plain lyrics.

use async_trait::async_trait;
use serde::Deserialize;

use super::{CaptionError, CaptionFetcher};

/// User agent string - LRCLIB asks clients to identify themselves
const USER_AGENT: &str = concat!(
    "PlaylistKeeper/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/playlist-keeper)"
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    #[serde(default)]
    synced_lyrics: Option<String>,
    #[serde(default)]
    plain_lyrics: Option<String>,
}

/// LRCLIB API client
pub struct LrclibClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    /// Create a new client
    pub fn new() -> Result<Self, CaptionError> {
        Self::with_base_url("https://lrclib.net")
    }

    /// Create a client against a different host
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CaptionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| CaptionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!("{}/api/search?q={}", self.base_url, urlencoding::encode(query))
    }

    async fn send_search_request(&self, query: &str) -> Result<Vec<SearchHit>, CaptionError> {
        let response = self
            .http_client
            .get(self.search_url(query))
            .send()
            .await
            .map_err(|e| CaptionError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CaptionError::Network(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(CaptionError::Api(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<Vec<SearchHit>>()
            .await
            .map_err(|e| CaptionError::Parse(e.to_string()))
    }
}

fn pick(hits: Vec<SearchHit>) -> Option<String> {
    let non_empty = |s: &Option<String>| s.as_deref().is_some_and(|t| !t.trim().is_empty());

    if let Some(hit) = hits.iter().find(|h| non_empty(&h.synced_lyrics)) {
        return hit.synced_lyrics.clone();
    }
    hits.into_iter()
        .find(|h| non_empty(&h.plain_lyrics))
        .and_then(|h| h.plain_lyrics)
}

#[async_trait]
impl CaptionFetcher for LrclibClient {
    async fn search(&self, query: &str) -> Result<Option<String>, CaptionError> {
        let hits = self.send_search_request(query).await?;
        Ok(pick(hits))
    }
}
