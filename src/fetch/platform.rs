use std::sync::LazyLock;

use futures::stream::{self, StreamExt};
use regex::Regex;

use crate::error::FetchError;
use crate::models::{Platform, RawPost, SourceDescriptor};

use super::feed::{paged, FeedClient};
use super::{FetchClient, FetchWindow, PostStream};

static X_STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/status(?:es)?/(\d+)").expect("valid regex"));
static INSTAGRAM_POST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:p|reel|tv)/([A-Za-z0-9_-]+)").expect("valid regex"));

/// `(from:handle) ("k1" OR "k2")`, or `None` without keywords.
pub fn search_query(handle: &str, keywords: &[String]) -> Option<String> {
    let terms: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| format!("\"{}\"", k.replace('"', "")))
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(format!("(from:{}) ({})", handle, terms.join(" OR ")))
}

/// Case-insensitive substring match against any non-blank keyword. No
/// keywords means everything matches.
pub fn keyword_match(text: &str, keywords: &[String]) -> bool {
    let mut terms = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .peekable();
    if terms.peek().is_none() {
        return true;
    }
    let text = text.to_lowercase();
    terms.any(|k| text.contains(&k))
}

fn retain_keywords(mut posts: Vec<RawPost>, keywords: &[String]) -> Vec<RawPost> {
    let before = posts.len();
    posts.retain(|p| keyword_match(&p.text, keywords));
    if posts.len() < before {
        tracing::debug!(dropped = before - posts.len(), "posts without keywords dropped");
    }
    posts
}

fn bridge_route(bridge_url: &str, route: &str, arg: &str) -> String {
    format!(
        "{}/{}/{}",
        bridge_url.trim_end_matches('/'),
        route,
        urlencoding::encode(arg)
    )
}

/// Replace feed entry ids with the platform-native id found in the post URL.
fn with_native_ids(mut posts: Vec<RawPost>, pattern: &Regex) -> Vec<RawPost> {
    for post in &mut posts {
        if let Some(id) = pattern.captures(&post.url).and_then(|c| c.get(1)) {
            post.post_id = id.as_str().to_string();
        }
    }
    posts
}

fn missing_handle<'a>(source: &SourceDescriptor) -> PostStream<'a> {
    let err = FetchError::Permanent(format!("no account handle in {}", source.url));
    stream::iter([Err::<Vec<RawPost>, _>(err)]).boxed()
}

pub struct XFetcher {
    client: FeedClient,
    bridge_url: String,
    keywords: Vec<String>,
    keyword_filter: bool,
}

impl XFetcher {
    pub fn new(client: FeedClient, bridge_url: &str, keywords: Vec<String>) -> Self {
        Self {
            client,
            bridge_url: bridge_url.to_string(),
            keywords,
            keyword_filter: false,
        }
    }

    /// Drop timeline posts that mention none of the keywords.
    pub fn with_keyword_filter(mut self, enabled: bool) -> Self {
        self.keyword_filter = enabled;
        self
    }

    fn filtered(&self, posts: Vec<RawPost>) -> Vec<RawPost> {
        if self.keyword_filter {
            retain_keywords(posts, &self.keywords)
        } else {
            posts
        }
    }
}

impl FetchClient for XFetcher {
    fn name(&self) -> &'static str {
        Platform::X.as_str()
    }

    fn fetch<'a>(&'a self, source: &'a SourceDescriptor, window: FetchWindow) -> PostStream<'a> {
        let Some(handle) = source.handle() else {
            return missing_handle(source);
        };

        paged(async move {
            if let Some(query) = search_query(&handle, &self.keywords) {
                let url = bridge_route(&self.bridge_url, "twitter/keyword", &query);
                match self.client.fetch_posts(&url, source, window).await {
                    Ok(posts) => {
                        let posts = self.filtered(posts);
                        if !posts.is_empty() {
                            return Ok(with_native_ids(posts, &X_STATUS_RE));
                        }
                        tracing::debug!(handle = %handle, "keyword search empty; using timeline");
                    }
                    Err(err) => {
                        tracing::warn!(handle = %handle, error = %err, "keyword search failed; using timeline");
                    }
                }
            }

            // Errors from the timeline route are what the collector sees.
            let url = bridge_route(&self.bridge_url, "twitter/user", &handle);
            let posts = self.client.fetch_posts(&url, source, window).await?;
            Ok(with_native_ids(self.filtered(posts), &X_STATUS_RE))
        })
    }
}

pub struct InstagramFetcher {
    client: FeedClient,
    bridge_url: String,
    candidate_multiplier: usize,
    keywords: Vec<String>,
}

impl InstagramFetcher {
    pub fn new(client: FeedClient, bridge_url: &str, candidate_multiplier: usize) -> Self {
        Self {
            client,
            bridge_url: bridge_url.to_string(),
            candidate_multiplier: candidate_multiplier.max(1),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

impl FetchClient for InstagramFetcher {
    fn name(&self) -> &'static str {
        Platform::Instagram.as_str()
    }

    // Pinned and already-seen posts crowd the top of the profile.
    fn candidate_multiplier(&self) -> usize {
        self.candidate_multiplier
    }

    fn fetch<'a>(&'a self, source: &'a SourceDescriptor, window: FetchWindow) -> PostStream<'a> {
        let Some(handle) = source.handle() else {
            return missing_handle(source);
        };

        paged(async move {
            let url = bridge_route(&self.bridge_url, "instagram/user", &handle);
            let posts = self.client.fetch_posts(&url, source, window).await?;
            let posts = retain_keywords(posts, &self.keywords);
            Ok(with_native_ids(posts, &INSTAGRAM_POST_RE))
        })
    }
}

pub struct FacebookFetcher {
    client: FeedClient,
    bridge_url: String,
    keywords: Vec<String>,
}

impl FacebookFetcher {
    pub fn new(client: FeedClient, bridge_url: &str) -> Self {
        Self {
            client,
            bridge_url: bridge_url.to_string(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

impl FetchClient for FacebookFetcher {
    fn name(&self) -> &'static str {
        Platform::Facebook.as_str()
    }

    fn fetch<'a>(&'a self, source: &'a SourceDescriptor, window: FetchWindow) -> PostStream<'a> {
        let Some(handle) = source.handle() else {
            return missing_handle(source);
        };

        paged(async move {
            let url = bridge_route(&self.bridge_url, "facebook/page", &handle);
            let posts = self.client.fetch_posts(&url, source, window).await?;
            Ok(retain_keywords(posts, &self.keywords))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::feed::tests::rss;
    use futures::TryStreamExt;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DATE: &str = "Mon, 06 Jan 2025 10:00:00 GMT";

    fn client() -> FeedClient {
        FeedClient::new(Duration::from_secs(5)).unwrap()
    }

    fn window() -> FetchWindow {
        FetchWindow {
            lookback: None,
            max_candidates: 50,
        }
    }

    #[test]
    fn builds_search_query() {
        let keywords = vec!["gpu".to_string(), " ".to_string(), "open \"weights\"".to_string()];
        assert_eq!(
            search_query("acme", &keywords).as_deref(),
            Some(r#"(from:acme) ("gpu" OR "open weights")"#)
        );
        assert_eq!(search_query("acme", &[]), None);
    }

    #[tokio::test]
    async fn x_uses_search_route_and_extracts_status_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/twitter/keyword/.+"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rss("https://x.com/acme", &[("1790000000000000001", DATE)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = XFetcher::new(client(), &server.uri(), vec!["chip".into()]);
        let source = SourceDescriptor::new("Tech", "AI", "Acme", "https://x.com/acme");
        let pages: Vec<Vec<RawPost>> = fetcher.fetch(&source, window()).try_collect().await.unwrap();

        assert_eq!(pages[0][0].post_id, "1790000000000000001");
        assert_eq!(pages[0][0].platform, Platform::X);
    }

    #[tokio::test]
    async fn x_falls_back_to_timeline_when_search_is_empty() {
        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/twitter/keyword/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss("https://x.com/acme", &[])))
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/acme"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(rss("https://x.com/acme", &[("42", DATE)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = XFetcher::new(client(), &server.uri(), vec!["chip".into()]);
        let source = SourceDescriptor::new("Tech", "AI", "Acme", "x.com/@acme");
        let pages: Vec<Vec<RawPost>> = fetcher.fetch(&source, window()).try_collect().await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0][0].post_id, "42");
    }

    #[tokio::test]
    async fn x_falls_back_to_timeline_when_search_fails() {
        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/twitter/keyword/.+"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/acme"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(rss("https://x.com/acme", &[("42", DATE)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = XFetcher::new(client(), &server.uri(), vec!["chip".into()]);
        let source = SourceDescriptor::new("Tech", "AI", "Acme", "https://x.com/acme");
        let pages: Vec<Vec<RawPost>> = fetcher.fetch(&source, window()).try_collect().await.unwrap();

        assert_eq!(pages[0][0].post_id, "42");
    }

    #[tokio::test]
    async fn x_reports_timeline_error_after_failed_search() {
        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/twitter/keyword/.+"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/acme"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = XFetcher::new(client(), &server.uri(), vec!["chip".into()]);
        let source = SourceDescriptor::new("Tech", "AI", "Acme", "https://x.com/acme");
        let result: Result<Vec<Vec<RawPost>>, FetchError> =
            fetcher.fetch(&source, window()).try_collect().await;

        assert!(matches!(result, Err(FetchError::Transient(_))));
    }

    #[test]
    fn keyword_match_ignores_case_and_blanks() {
        let keywords = vec!["GPU".to_string(), "  ".to_string()];
        assert!(keyword_match("New gpu cluster online", &keywords));
        assert!(!keyword_match("Quarterly results", &keywords));
        assert!(keyword_match("anything", &[]));
        assert!(keyword_match("anything", &[" ".to_string()]));
    }

    #[tokio::test]
    async fn facebook_drops_posts_without_keywords() {
        let server = MockServer::start().await;
        let body = rss("https://facebook.com/acme", &[("chip-news", DATE), ("weather", DATE)]);
        Mock::given(path("/facebook/page/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let fetcher = FacebookFetcher::new(client(), &server.uri()).with_keywords(vec!["Chip".into()]);
        let source = SourceDescriptor::new("Tech", "AI", "Acme", "https://facebook.com/acme");
        let pages: Vec<Vec<RawPost>> = fetcher.fetch(&source, window()).try_collect().await.unwrap();

        let texts: Vec<&str> = pages.iter().flatten().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Body of chip-news"]);
    }

    #[tokio::test]
    async fn x_keyword_filter_is_opt_in() {
        let server = MockServer::start().await;
        let body = rss("https://x.com/acme", &[("1", DATE), ("2", DATE)])
            .replacen("Body of 1", "Body of 1 about chips", 1);
        Mock::given(path("/twitter/user/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        // keyword search always fails here, so both fetchers read the timeline
        Mock::given(path_regex(r"^/twitter/keyword/.+"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = SourceDescriptor::new("Tech", "AI", "Acme", "https://x.com/acme");
        let plain = XFetcher::new(client(), &server.uri(), vec!["chip".into()]);
        let pages: Vec<Vec<RawPost>> = plain.fetch(&source, window()).try_collect().await.unwrap();
        assert_eq!(pages.iter().flatten().count(), 2);

        let filtering = XFetcher::new(client(), &server.uri(), vec!["chip".into()]).with_keyword_filter(true);
        let pages: Vec<Vec<RawPost>> = filtering.fetch(&source, window()).try_collect().await.unwrap();
        let ids: Vec<&str> = pages.iter().flatten().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[tokio::test]
    async fn instagram_route_and_shortcodes() {
        let server = MockServer::start().await;
        let body = rss("https://www.instagram.com/p", &[("Cx_9-a", DATE)])
            .replace("/p/status/", "/p/");
        Mock::given(path("/instagram/user/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let fetcher = InstagramFetcher::new(client(), &server.uri(), 4);
        let source = SourceDescriptor::new("Tech", "AI", "Acme", "https://instagram.com/acme/");
        assert_eq!(source.platform, Platform::Instagram);

        let pages: Vec<Vec<RawPost>> = fetcher.fetch(&source, window()).try_collect().await.unwrap();
        assert_eq!(pages[0][0].post_id, "Cx_9-a");
        assert_eq!(fetcher.candidate_multiplier(), 4);
    }

    #[tokio::test]
    async fn missing_handle_is_permanent() {
        let fetcher = FacebookFetcher::new(client(), "http://127.0.0.1:9");
        let source = SourceDescriptor::new("", "", "", "https://facebook.com/");
        let result: Result<Vec<Vec<RawPost>>, FetchError> =
            fetcher.fetch(&source, window()).try_collect().await;
        assert!(matches!(result, Err(FetchError::Permanent(_))));
    }
}
