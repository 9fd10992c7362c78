use std::future::Future;
use std::time::Duration;

use feed_rs::model::Entry;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;

use crate::error::{FetchError, Result};
use crate::models::{Platform, RawPost, SourceDescriptor};

use super::{into_pages, FetchClient, FetchWindow, PostStream, PAGE_SIZE};

/// Shared HTTP + RSS/Atom plumbing for every fetcher.
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
}

impl FeedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("sns-digest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Download and parse one feed document. Posts come back newest-first and
    /// truncated to `window.max_candidates`.
    pub async fn fetch_posts(
        &self,
        feed_url: &str,
        source: &SourceDescriptor,
        window: FetchWindow,
    ) -> std::result::Result<Vec<RawPost>, FetchError> {
        let response = self.client.get(feed_url).send().await?;
        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        let mut posts: Vec<RawPost> = feed
            .entries
            .into_iter()
            .map(|entry| post_from_entry(entry, source))
            .collect();

        // undated entries sink to the end
        posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        posts.truncate(window.max_candidates.max(1));

        tracing::debug!(url = %feed_url, posts = posts.len(), "fetched feed");
        Ok(posts)
    }
}

fn post_from_entry(entry: Entry, source: &SourceDescriptor) -> RawPost {
    // Try content first, then fall back to summary
    let content_html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_ref())
        .or_else(|| entry.summary.as_ref().map(|s| &s.content));

    let title = entry.title.map(|t| t.content).unwrap_or_default();
    let text = content_html
        .and_then(|html| html2text::from_read(html.as_bytes(), 80).ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| title.trim().to_string());

    RawPost {
        source_url: source.url.clone(),
        post_id: entry.id,
        url: entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        author: entry.authors.first().map(|a| a.name.clone()),
        text,
        published_at: entry.published.or(entry.updated),
        platform: source.platform,
    }
}

/// Wrap a one-shot download as a lazy stream of pages.
pub(crate) fn paged<'a, F>(download: F) -> PostStream<'a>
where
    F: Future<Output = std::result::Result<Vec<RawPost>, FetchError>> + Send + 'a,
{
    stream::once(download)
        .flat_map(|res| {
            let pages: Vec<_> = match res {
                Ok(posts) => into_pages(posts, PAGE_SIZE).into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(pages)
        })
        .boxed()
}

/// Plain RSS/Atom sources: the source URL is the feed.
pub struct FeedFetcher {
    client: FeedClient,
}

impl FeedFetcher {
    pub fn new(client: FeedClient) -> Self {
        Self { client }
    }
}

impl FetchClient for FeedFetcher {
    fn name(&self) -> &'static str {
        Platform::Feed.as_str()
    }

    fn fetch<'a>(&'a self, source: &'a SourceDescriptor, window: FetchWindow) -> PostStream<'a> {
        paged(self.client.fetch_posts(&source.url, source, window))
    }
}
