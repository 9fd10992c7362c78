use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::{RawPost, SourceDescriptor};
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStopReason {
    /// Consecutive fetch iterations produced nothing new.
    NoGrowth,
    /// Consecutive posts were older than the lookback window.
    OldPosts,
}

/// How a source collection ended. Only `Exhausted` carries an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Succeeded,
    EarlyStopped(EarlyStopReason),
    Exhausted,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Succeeded => f.write_str("succeeded"),
            Termination::EarlyStopped(EarlyStopReason::NoGrowth) => {
                f.write_str("early-stopped (no growth)")
            }
            Termination::EarlyStopped(EarlyStopReason::OldPosts) => {
                f.write_str("early-stopped (old posts)")
            }
            Termination::Exhausted => f.write_str("exhausted"),
            Termination::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub pages: usize,
    pub cache_hits: usize,
    pub old_posts: usize,
    pub unknown_time: usize,
    pub replayed: usize,
}

#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub source: SourceDescriptor,
    pub posts: Vec<RawPost>,
    pub error: Option<FetchError>,
    pub attempts: u32,
    pub termination: Termination,
    pub stats: CollectionStats,
}

impl CollectionResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Per-run results keyed by source URL. Insertion order does not matter.
#[derive(Debug, Clone, Default)]
pub struct CollectionResults {
    by_source: BTreeMap<String, CollectionResult>,
}

impl CollectionResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous result for the same source, if any.
    pub fn insert(&mut self, result: CollectionResult) -> Option<CollectionResult> {
        self.by_source.insert(result.source.url.clone(), result)
    }

    pub fn get(&self, source_url: &str) -> Option<&CollectionResult> {
        self.by_source.get(source_url)
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionResult> {
        self.by_source.values()
    }

    pub fn total_posts(&self) -> usize {
        self.by_source.values().map(|r| r.posts.len()).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CollectionResult> {
        self.by_source.values().filter(|r| r.is_error())
    }

    pub fn into_posts(self) -> Vec<RawPost> {
        self.by_source
            .into_values()
            .flat_map(|r| r.posts)
            .collect()
    }
}
