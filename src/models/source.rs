use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X,
    Instagram,
    Facebook,
    /// A plain RSS/Atom feed URL.
    Feed,
}

impl Platform {
    /// Guess the platform from the host of a source URL.
    pub fn detect(url: &str) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_default();

        if host_matches(&host, "x.com") || host_matches(&host, "twitter.com") {
            Platform::X
        } else if host_matches(&host, "instagram.com") {
            Platform::Instagram
        } else if host_matches(&host, "facebook.com") || host_matches(&host, "fb.com") {
            Platform::Facebook
        } else {
            Platform::Feed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Feed => "feed",
        }
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured account or feed. Identity is the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub category: String,
    pub group: String,
    pub name: String,
    pub url: String,
    pub platform: Platform,
}

impl SourceDescriptor {
    pub fn new(
        category: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
        url: impl AsRef<str>,
    ) -> Self {
        let url = with_scheme(url.as_ref().trim());
        let platform = Platform::detect(&url);
        Self {
            category: category.into(),
            group: group.into(),
            name: name.into(),
            url,
            platform,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Account handle: first path segment of the URL, without a leading `@`.
    pub fn handle(&self) -> Option<String> {
        let parsed = Url::parse(&self.url).ok()?;
        let segment = parsed.path_segments()?.find(|s| !s.is_empty())?;
        let handle = segment.trim_start_matches('@');
        if handle.is_empty() {
            None
        } else {
            Some(handle.to_string())
        }
    }

    /// Name to show in logs and reports.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
