//! Platform fetchers. Each turns a source into a lazy stream of pages of
//! posts, newest first.

mod feed;
mod platform;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;

use crate::error::{FetchError, Result};
use crate::models::{Platform, RawPost, SourceDescriptor};

pub use feed::{FeedClient, FeedFetcher};
pub use platform::{keyword_match, FacebookFetcher, InstagramFetcher, XFetcher};

/// One item per fetch iteration.
pub type PostStream<'a> = BoxStream<'a, std::result::Result<Vec<RawPost>, FetchError>>;

/// Posts per page when a backend hands back one big document.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub lookback: Option<Duration>,
    /// Upper bound on posts the backend should yield in one scan.
    pub max_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub bridge_url: String,
    /// Search terms for X keyword routes, and a content filter for
    /// Instagram and Facebook posts.
    pub keywords: Vec<String>,
    /// Apply the content filter to X posts too.
    pub x_keyword_filter: bool,
    pub instagram_candidate_multiplier: usize,
    pub request_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            bridge_url: "https://rsshub.app".to_string(),
            keywords: Vec::new(),
            x_keyword_filter: false,
            instagram_candidate_multiplier: 4,
            request_timeout: Duration::from_secs(25),
        }
    }
}

pub trait FetchClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Factor applied to the per-source limit to size `max_candidates`, for
    /// backends that return many posts which later get filtered out.
    fn candidate_multiplier(&self) -> usize {
        1
    }

    /// Start a fresh scan. Nothing is requested until the stream is polled.
    fn fetch<'a>(&'a self, source: &'a SourceDescriptor, window: FetchWindow) -> PostStream<'a>;
}

/// Platform → fetcher lookup. Collectors only ever see the trait.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    clients: HashMap<Platform, Arc<dyn FetchClient>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the RSS-bridge backed fetchers for every platform.
    pub fn from_settings(settings: &FetchSettings) -> Result<Self> {
        let client = FeedClient::new(settings.request_timeout)?;

        let mut registry = Self::new();
        registry.register(Platform::Feed, Arc::new(FeedFetcher::new(client.clone())));
        registry.register(
            Platform::X,
            Arc::new(
                XFetcher::new(client.clone(), &settings.bridge_url, settings.keywords.clone())
                    .with_keyword_filter(settings.x_keyword_filter),
            ),
        );
        registry.register(
            Platform::Instagram,
            Arc::new(
                InstagramFetcher::new(
                    client.clone(),
                    &settings.bridge_url,
                    settings.instagram_candidate_multiplier,
                )
                .with_keywords(settings.keywords.clone()),
            ),
        );
        registry.register(
            Platform::Facebook,
            Arc::new(
                FacebookFetcher::new(client, &settings.bridge_url)
                    .with_keywords(settings.keywords.clone()),
            ),
        );
        Ok(registry)
    }

    pub fn register(&mut self, platform: Platform, client: Arc<dyn FetchClient>) {
        self.clients.insert(platform, client);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn FetchClient>> {
        self.clients.get(&platform).cloned()
    }
}

/// Split a newest-first list into pages of `page_size`.
pub(crate) fn into_pages(posts: Vec<RawPost>, page_size: usize) -> Vec<Vec<RawPost>> {
    let page_size = page_size.max(1);
    let mut pages = Vec::with_capacity(posts.len().div_ceil(page_size));
    let mut iter = posts.into_iter().peekable();
    while iter.peek().is_some() {
        pages.push(iter.by_ref().take(page_size).collect());
    }
    pages
}
