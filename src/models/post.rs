use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub source_url: String,
    /// Platform-native id; may be empty when the backend has none.
    pub post_id: String,
    pub url: String,
    pub author: Option<String>,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    pub platform: Platform,
}

impl RawPost {
    /// Key used for cross-run deduplication: `platform:post_id` when the
    /// platform gave us an id, else the normalized post URL.
    pub fn dedup_key(&self) -> String {
        let id = self.post_id.trim();
        if id.is_empty() {
            normalize_url(&self.url)
        } else {
            format!("{}:{}", self.platform, id)
        }
    }
}

/// Lowercases scheme and host, drops the fragment and `utm_*` tracking
/// parameters, and trims a trailing slash. Unparseable input is only trimmed.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut out = url.to_string();
    if url.query().is_none() {
        while out.ends_with('/') {
            out.pop();
        }
    }
    out
}
