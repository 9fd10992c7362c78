use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{CacheKind, CacheStore};
use crate::models::{CollectionStats, EarlyStopReason, RawPost, Termination};

use super::CollectorSettings;

/// Lifecycle of one source collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Starting,
    Fetching { attempt: u32 },
    Retrying { retry: u32, delay: Duration },
    Done(Termination),
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorState::Starting => f.write_str("starting"),
            CollectorState::Fetching { attempt } => write!(f, "fetching (attempt {})", attempt),
            CollectorState::Retrying { retry, delay } => {
                write!(f, "retrying (#{} in {}ms)", retry, delay.as_millis())
            }
            CollectorState::Done(t) => t.fmt(f),
        }
    }
}

/// Early-stop counters. Reset at the start of every fresh scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub no_growth: u32,
    pub old_streak: u32,
}

/// Everything a collector keeps across attempts for one source.
#[derive(Debug)]
pub struct Accumulator {
    pub posts: Vec<RawPost>,
    accepted: HashSet<String>,
    pub stats: CollectionStats,
    cutoff: Option<DateTime<Utc>>,
    limit: usize,
    no_growth_limit: u32,
    old_post_limit: u32,
    include_unknown_time: bool,
}

impl Accumulator {
    pub fn new(settings: &CollectorSettings, now: DateTime<Utc>) -> Self {
        let cutoff = settings
            .lookback
            .and_then(|lb| chrono::Duration::from_std(lb).ok())
            .and_then(|lb| now.checked_sub_signed(lb));

        Self {
            posts: Vec::new(),
            accepted: HashSet::new(),
            stats: CollectionStats::default(),
            cutoff,
            limit: settings.limit_per_source.max(1),
            no_growth_limit: settings.no_growth_break_limit,
            old_post_limit: settings.old_post_break_limit,
            include_unknown_time: settings.include_unknown_time,
        }
    }

    pub fn is_full(&self) -> bool {
        self.posts.len() >= self.limit
    }

    /// Apply one fetched page, in yield order. Returns the terminal state as
    /// soon as a limit is reached; the rest of the page is not examined.
    pub fn ingest_page(
        &mut self,
        page: Vec<RawPost>,
        counters: &mut ScanCounters,
        cache: &CacheStore,
    ) -> Option<Termination> {
        self.stats.pages += 1;

        let mut accepted_here = 0usize;
        let mut replayed_here = 0usize;
        let page_len = page.len();

        for post in page {
            let key = post.dedup_key();

            if self.accepted.contains(&key) {
                self.stats.replayed += 1;
                replayed_here += 1;
                continue;
            }

            if cache.lookup(CacheKind::UrlSeen, &key).is_some() {
                self.stats.cache_hits += 1;
                continue;
            }

            match (post.published_at, self.cutoff) {
                (Some(published), Some(cutoff)) if published < cutoff => {
                    self.stats.old_posts += 1;
                    counters.old_streak += 1;
                    if reached(counters.old_streak, self.old_post_limit) {
                        return Some(Termination::EarlyStopped(EarlyStopReason::OldPosts));
                    }
                    continue;
                }
                (None, _) => {
                    self.stats.unknown_time += 1;
                    counters.old_streak = 0;
                    if !self.include_unknown_time {
                        continue;
                    }
                }
                _ => counters.old_streak = 0,
            }

            cache.put(CacheKind::UrlSeen, &key, &post.url);
            self.accepted.insert(key);
            self.posts.push(post);
            accepted_here += 1;

            if self.is_full() {
                return Some(Termination::Succeeded);
            }
        }

        let pure_replay = page_len > 0 && replayed_here == page_len;
        if accepted_here > 0 {
            counters.no_growth = 0;
        } else if !pure_replay {
            counters.no_growth += 1;
            if reached(counters.no_growth, self.no_growth_limit) {
                return Some(Termination::EarlyStopped(EarlyStopReason::NoGrowth));
            }
        }

        None
    }
}

/// A limit of zero disables the heuristic.
fn reached(count: u32, limit: u32) -> bool {
    limit > 0 && count >= limit
}
