#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use sns_digest::error::FetchError;
use sns_digest::fetch::{FetchClient, FetchWindow, PostStream};
use sns_digest::models::{Platform, RawPost, SourceDescriptor};

pub type Page = Result<Vec<RawPost>, FetchError>;

/// Fetch client that replays one scripted scan per `fetch` call. Once the
/// script runs out every scan is empty.
pub struct ScriptedFetcher {
    scans: Mutex<VecDeque<Vec<Page>>>,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    pub fn new(scans: Vec<Vec<Page>>) -> Self {
        Self {
            scans: Mutex::new(scans.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FetchClient for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn fetch<'a>(&'a self, _source: &'a SourceDescriptor, _window: FetchWindow) -> PostStream<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scan = self.scans.lock().pop_front().unwrap_or_default();
        stream::iter(scan).boxed()
    }
}

/// Yields `page`, then never produces another item.
pub struct StalledFetcher {
    page: Vec<RawPost>,
}

impl StalledFetcher {
    pub fn new(page: Vec<RawPost>) -> Self {
        Self { page }
    }
}

impl FetchClient for StalledFetcher {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn fetch<'a>(&'a self, _source: &'a SourceDescriptor, _window: FetchWindow) -> PostStream<'a> {
        let first = stream::iter([Ok(self.page.clone())]);
        let stalled = stream::once(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(Vec::new())
        });
        first.chain(stalled).boxed()
    }
}

pub fn source() -> SourceDescriptor {
    SourceDescriptor::new("Big Tech", "AI", "Acme", "https://x.com/acme")
}

/// Post `n` of the acme timeline, published `age_hours` ago.
pub fn post(n: u32, age_hours: i64) -> RawPost {
    RawPost {
        source_url: "https://x.com/acme".into(),
        post_id: n.to_string(),
        url: format!("https://x.com/acme/status/{n}"),
        author: Some("acme".into()),
        text: format!("Acme update number {n}. Details inside."),
        published_at: Some(Utc::now() - Duration::hours(age_hours)),
        platform: Platform::X,
    }
}

pub fn transient() -> Page {
    Err(FetchError::Transient("connection reset".into()))
}
