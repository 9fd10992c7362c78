//! Per-source collection: fetch pages, filter through the cache, stop early
//! when a source stops yielding anything useful, retry transient failures.

pub mod retry;
mod state;

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::error::FetchError;
use crate::fetch::{FetchClient, FetchWindow};
use crate::models::{CollectionResult, SourceDescriptor, Termination};

pub use retry::{sleep_or_cancel, RetryPolicy};
pub use state::{Accumulator, CollectorState, ScanCounters};

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Posts published before `now - lookback` count as old. `None` disables
    /// the age filter.
    pub lookback: Option<Duration>,
    pub limit_per_source: usize,
    /// Consecutive pages without a new post before giving up; 0 disables.
    pub no_growth_break_limit: u32,
    /// Consecutive too-old posts before giving up; 0 disables.
    pub old_post_break_limit: u32,
    pub include_unknown_time: bool,
    pub retry: RetryPolicy,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            lookback: Some(Duration::from_secs(24 * 3600)),
            limit_per_source: 20,
            no_growth_break_limit: 2,
            old_post_break_limit: 8,
            include_unknown_time: false,
            retry: RetryPolicy::default(),
        }
    }
}

enum ScanOutcome {
    Finished(Termination),
    Failed(FetchError),
    Cancelled,
}

pub struct SourceCollector<'a> {
    client: &'a dyn FetchClient,
    cache: &'a CacheStore,
    settings: &'a CollectorSettings,
}

impl<'a> SourceCollector<'a> {
    pub fn new(
        client: &'a dyn FetchClient,
        cache: &'a CacheStore,
        settings: &'a CollectorSettings,
    ) -> Self {
        Self {
            client,
            cache,
            settings,
        }
    }

    /// Collect one source to a terminal state. Never fails: errors end up in
    /// the result together with whatever was gathered before them.
    ///
    /// Accepted posts are marked seen in memory only; the caller decides
    /// when they are persisted.
    pub async fn collect(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> CollectionResult {
        let mut acc = Accumulator::new(self.settings, Utc::now());
        let window = FetchWindow {
            lookback: self.settings.lookback,
            max_candidates: self
                .settings
                .limit_per_source
                .max(1)
                .saturating_mul(self.client.candidate_multiplier().max(1)),
        };

        let mut state = CollectorState::Starting;
        self.log_state(source, state);

        let mut attempts = 0u32;
        let mut retries = 0u32;
        let mut error = None;

        let termination = loop {
            attempts += 1;
            state = CollectorState::Fetching { attempt: attempts };
            self.log_state(source, state);

            match self.scan(source, window, &mut acc, cancel).await {
                ScanOutcome::Finished(termination) => break termination,
                ScanOutcome::Cancelled => break Termination::Cancelled,
                ScanOutcome::Failed(err) => {
                    let retry = retries + 1;
                    if !err.is_retryable() || !self.settings.retry.can_retry(retry) {
                        tracing::warn!(
                            source = %source.label(),
                            attempts,
                            error = %err,
                            "giving up on source"
                        );
                        error = Some(err);
                        break Termination::Exhausted;
                    }

                    retries = retry;
                    let delay = self.settings.retry.delay_for_retry(retry);
                    state = CollectorState::Retrying { retry, delay };
                    self.log_state(source, state);
                    tracing::info!(
                        source = %source.label(),
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "fetch failed; backing off"
                    );

                    if !sleep_or_cancel(delay, cancel).await {
                        break Termination::Cancelled;
                    }
                }
            }
        };

        state = CollectorState::Done(termination);
        self.log_state(source, state);

        tracing::info!(
            source = %source.label(),
            platform = %source.platform,
            posts = acc.posts.len(),
            attempts,
            termination = %termination,
            cache_hits = acc.stats.cache_hits,
            old_posts = acc.stats.old_posts,
            "source collected"
        );

        CollectionResult {
            source: source.clone(),
            posts: acc.posts,
            error,
            attempts,
            termination,
            stats: acc.stats,
        }
    }

    /// One fresh scan of the source. Early-stop counters start at zero; the
    /// accumulator carries over from earlier attempts.
    async fn scan(
        &self,
        source: &SourceDescriptor,
        window: FetchWindow,
        acc: &mut Accumulator,
        cancel: &CancellationToken,
    ) -> ScanOutcome {
        let mut pages = self.client.fetch(source, window);
        let mut counters = ScanCounters::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ScanOutcome::Cancelled,
                page = pages.next() => page,
            };

            match next {
                None => return ScanOutcome::Finished(Termination::Succeeded),
                Some(Err(err)) => return ScanOutcome::Failed(err),
                Some(Ok(page)) => {
                    if let Some(termination) = acc.ingest_page(page, &mut counters, self.cache) {
                        return ScanOutcome::Finished(termination);
                    }
                }
            }
        }
    }

    fn log_state(&self, source: &SourceDescriptor, state: CollectorState) {
        tracing::debug!(source = %source.url, state = %state, "collector state");
    }
}
