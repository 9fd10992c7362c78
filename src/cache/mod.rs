//! Persistent cache of seen posts, summaries and translations.
//!
//! Lookups and puts are served from in-memory partitions, one lock per
//! [`CacheKind`], and never suspend. Dirty entries are written to the
//! backend in batches by [`CacheStore::flush`] or, for a subset of kinds, by
//! [`CacheStore::flush_kinds`].

mod schema;
mod sqlite;
mod store;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CacheError;

pub use sqlite::SqliteBackend;
pub use store::{CacheStats, CacheStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    UrlSeen,
    Summary,
    Translation,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::UrlSeen, CacheKind::Summary, CacheKind::Translation];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::UrlSeen => "url_seen",
            CacheKind::Summary => "summary",
            CacheKind::Translation => "translation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    fn index(&self) -> usize {
        match self {
            CacheKind::UrlSeen => 0,
            CacheKind::Summary => 1,
            CacheKind::Translation => 2,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub kind: CacheKind,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// When false the store never touches disk.
    pub enabled: bool,
    pub path: PathBuf,
    /// Entries not seen within this window are purged. `None` keeps everything.
    pub window: Option<Duration>,
    /// Upper bound on `url_seen` entries; 0 means unlimited.
    pub max_url_entries: usize,
}

/// Durable storage behind the in-memory store.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Entries seen at or after `since`; `url_seen` entries newest-first and
    /// limited to `max_url_entries` (0 = no limit).
    async fn load(
        &self,
        since: Option<DateTime<Utc>>,
        max_url_entries: usize,
    ) -> Result<Vec<CacheEntry>, CacheError>;

    async fn upsert(&self, entries: Vec<CacheEntry>) -> Result<(), CacheError>;

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError>;

    /// Delete the oldest `url_seen` rows until at most `max` remain.
    async fn enforce_url_cap(&self, max: usize) -> Result<usize, CacheError>;
}
