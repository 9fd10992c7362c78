use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::CacheError;

use super::{CacheBackend, CacheEntry, CacheKind, CacheSettings, SqliteBackend};

#[derive(Default)]
struct Partition {
    entries: HashMap<String, CacheEntry>,
    /// Keys written or touched since the last flush.
    dirty: HashSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub url_seen: usize,
    pub summaries: usize,
    pub translations: usize,
    pub persistent: bool,
}

pub struct CacheStore {
    partitions: [Mutex<Partition>; 3],
    backend: RwLock<Option<Arc<dyn CacheBackend>>>,
    max_url_entries: usize,
}

impl CacheStore {
    /// Memory-only store; nothing survives the process.
    pub fn in_memory(max_url_entries: usize) -> Self {
        Self {
            partitions: Default::default(),
            backend: RwLock::new(None),
            max_url_entries,
        }
    }

    /// Open the store described by `settings`. Never fails: if the database
    /// cannot be opened the store runs memory-only.
    pub async fn open(settings: &CacheSettings) -> Self {
        if !settings.enabled {
            return Self::in_memory(settings.max_url_entries);
        }

        match SqliteBackend::open(&settings.path).await {
            Ok(backend) => Self::with_backend(Arc::new(backend), settings).await,
            Err(e) => {
                tracing::warn!(
                    path = %settings.path.display(),
                    error = %e,
                    "cache unavailable; continuing with in-memory cache"
                );
                Self::in_memory(settings.max_url_entries)
            }
        }
    }

    /// Wrap an already-open backend and warm the memory partitions with the
    /// entries seen inside the cache window.
    pub async fn with_backend(backend: Arc<dyn CacheBackend>, settings: &CacheSettings) -> Self {
        let store = Self {
            partitions: Default::default(),
            backend: RwLock::new(Some(backend.clone())),
            max_url_entries: settings.max_url_entries,
        };

        let since = settings.window.and_then(|w| cutoff(Utc::now(), w));
        match backend.load(since, settings.max_url_entries).await {
            Ok(entries) => {
                let loaded = entries.len();
                for entry in entries {
                    let mut part = store.partitions[entry.kind.index()].lock();
                    part.entries.insert(entry.key.clone(), entry);
                }
                tracing::debug!(loaded, "cache warmed from backend");
            }
            Err(e) => store.degrade(e),
        }
        store
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.read().is_some()
    }

    /// Returns the cached value and refreshes the entry's `last_seen_at`.
    pub fn lookup(&self, kind: CacheKind, key: &str) -> Option<String> {
        let mut part = self.partitions[kind.index()].lock();
        let entry = part.entries.get_mut(key)?;
        entry.last_seen_at = Utc::now();
        let value = entry.value.clone();
        part.dirty.insert(key.to_string());
        Some(value)
    }

    /// Like [`lookup`](Self::lookup) but without touching the entry.
    pub fn contains(&self, kind: CacheKind, key: &str) -> bool {
        self.partitions[kind.index()].lock().entries.contains_key(key)
    }

    pub fn put(&self, kind: CacheKind, key: &str, value: &str) {
        self.put_at(kind, key, value, Utc::now());
    }

    fn put_at(&self, kind: CacheKind, key: &str, value: &str, now: DateTime<Utc>) {
        let mut part = self.partitions[kind.index()].lock();
        part.entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.value = value.to_string();
                e.last_seen_at = now;
            })
            .or_insert_with(|| CacheEntry {
                kind,
                key: key.to_string(),
                value: value.to_string(),
                created_at: now,
                last_seen_at: now,
            });
        part.dirty.insert(key.to_string());
    }

    /// Persist everything written since the last flush as one batch, then
    /// enforce the `url_seen` cap. Returns the number of entries written.
    pub async fn flush(&self) -> usize {
        self.flush_kinds(&CacheKind::ALL).await
    }

    /// Persist the dirty entries of `kinds` only. Other kinds stay dirty
    /// until a later flush includes them.
    pub async fn flush_kinds(&self, kinds: &[CacheKind]) -> usize {
        let mut batch = Vec::new();
        for kind in kinds {
            let mut part = self.partitions[kind.index()].lock();
            let dirty = std::mem::take(&mut part.dirty);
            batch.extend(dirty.iter().filter_map(|k| part.entries.get(k).cloned()));
        }
        let written = batch.len();

        if let Some(backend) = self.backend() {
            if !batch.is_empty() {
                if let Err(e) = backend.upsert(batch).await {
                    self.degrade(e);
                }
            }
        }

        if kinds.contains(&CacheKind::UrlSeen) {
            self.enforce_cap(self.max_url_entries).await;
        }
        written
    }

    /// Remove entries whose `last_seen_at` is older than `now - window`.
    pub async fn purge(&self, window: Duration) -> usize {
        let Some(cutoff) = cutoff(Utc::now(), window) else {
            return 0;
        };

        let mut removed = 0;
        for partition in &self.partitions {
            let mut part = partition.lock();
            let before = part.entries.len();
            part.entries.retain(|_, e| e.last_seen_at >= cutoff);
            removed += before - part.entries.len();
            let Partition { entries, dirty } = &mut *part;
            dirty.retain(|k| entries.contains_key(k));
        }

        if let Some(backend) = self.backend() {
            match backend.purge_before(cutoff).await {
                Ok(n) => removed = removed.max(n),
                Err(e) => self.degrade(e),
            }
        }
        removed
    }

    /// Evict the oldest `url_seen` entries until at most `max` remain.
    /// `max == 0` means unlimited.
    pub async fn enforce_cap(&self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }

        let evicted = {
            let mut part = self.partitions[CacheKind::UrlSeen.index()].lock();
            let excess = part.entries.len().saturating_sub(max);
            if excess > 0 {
                let mut by_age: Vec<(DateTime<Utc>, String)> = part
                    .entries
                    .values()
                    .map(|e| (e.last_seen_at, e.key.clone()))
                    .collect();
                by_age.sort();
                for (_, key) in by_age.into_iter().take(excess) {
                    part.entries.remove(&key);
                    part.dirty.remove(&key);
                }
            }
            excess
        };

        if let Some(backend) = self.backend() {
            if let Err(e) = backend.enforce_url_cap(max).await {
                self.degrade(e);
            }
        }

        if evicted > 0 {
            tracing::debug!(evicted, max, "evicted oldest url_seen entries");
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        let len = |kind: CacheKind| self.partitions[kind.index()].lock().entries.len();
        CacheStats {
            url_seen: len(CacheKind::UrlSeen),
            summaries: len(CacheKind::Summary),
            translations: len(CacheKind::Translation),
            persistent: self.is_persistent(),
        }
    }

    fn backend(&self) -> Option<Arc<dyn CacheBackend>> {
        self.backend.read().clone()
    }

    /// Drop the backend for the rest of the run.
    fn degrade(&self, error: CacheError) {
        if self.backend.write().take().is_some() {
            tracing::warn!(error = %error, "cache backend failed; continuing with in-memory cache");
        }
    }
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    let window = chrono::Duration::from_std(window).ok()?;
    now.checked_sub_signed(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingBackend {
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn load(
            &self,
            _since: Option<DateTime<Utc>>,
            _max: usize,
        ) -> Result<Vec<CacheEntry>, CacheError> {
            Ok(Vec::new())
        }

        async fn upsert(&self, _entries: Vec<CacheEntry>) -> Result<(), CacheError> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Unavailable("disk full".into()))
        }

        async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
            Ok(0)
        }

        async fn enforce_url_cap(&self, _max: usize) -> Result<usize, CacheError> {
            Ok(0)
        }
    }

    fn settings(max: usize) -> CacheSettings {
        CacheSettings {
            enabled: true,
            path: "unused.sqlite3".into(),
            window: None,
            max_url_entries: max,
        }
    }

    #[test]
    fn put_then_lookup_per_kind() {
        let store = CacheStore::in_memory(0);
        assert_eq!(store.lookup(CacheKind::Summary, "k"), None);

        store.put(CacheKind::Summary, "k", "summary");
        store.put(CacheKind::Translation, "k", "translation");

        assert_eq!(store.lookup(CacheKind::Summary, "k").as_deref(), Some("summary"));
        assert_eq!(store.lookup(CacheKind::Translation, "k").as_deref(), Some("translation"));
        assert!(!store.contains(CacheKind::UrlSeen, "k"));
    }

    #[test]
    fn put_twice_keeps_one_entry_and_created_at() {
        let store = CacheStore::in_memory(0);
        let t0 = Utc::now() - ChronoDuration::hours(3);
        store.put_at(CacheKind::UrlSeen, "a", "1", t0);
        store.put(CacheKind::UrlSeen, "a", "2");

        let part = store.partitions[CacheKind::UrlSeen.index()].lock();
        assert_eq!(part.entries.len(), 1);
        let entry = &part.entries["a"];
        assert_eq!(entry.value, "2");
        assert_eq!(entry.created_at, t0);
        assert!(entry.last_seen_at > t0);
    }

    #[tokio::test]
    async fn enforce_cap_evicts_globally_oldest_first() {
        let store = CacheStore::in_memory(0);
        let now = Utc::now();
        for (key, age_h) in [("d", 1), ("a", 5), ("c", 2), ("b", 4), ("e", 0)] {
            store.put_at(CacheKind::UrlSeen, key, "1", now - ChronoDuration::hours(age_h));
        }
        // summaries are never evicted by the url cap
        store.put_at(CacheKind::Summary, "s", "x", now - ChronoDuration::hours(99));

        assert_eq!(store.enforce_cap(3).await, 2);
        assert_eq!(store.stats().url_seen, 3);
        assert!(!store.contains(CacheKind::UrlSeen, "a"));
        assert!(!store.contains(CacheKind::UrlSeen, "b"));
        assert!(store.contains(CacheKind::UrlSeen, "c"));
        assert!(store.contains(CacheKind::Summary, "s"));

        assert_eq!(store.enforce_cap(3).await, 0);
    }

    #[tokio::test]
    async fn lookup_refreshes_age_for_eviction() {
        let store = CacheStore::in_memory(0);
        let now = Utc::now();
        store.put_at(CacheKind::UrlSeen, "old-but-used", "1", now - ChronoDuration::hours(10));
        store.put_at(CacheKind::UrlSeen, "newer", "1", now - ChronoDuration::hours(1));

        assert!(store.lookup(CacheKind::UrlSeen, "old-but-used").is_some());
        store.enforce_cap(1).await;

        assert!(store.contains(CacheKind::UrlSeen, "old-but-used"));
        assert!(!store.contains(CacheKind::UrlSeen, "newer"));
    }

    #[tokio::test]
    async fn purge_drops_entries_outside_window() {
        let store = CacheStore::in_memory(0);
        let now = Utc::now();
        store.put_at(CacheKind::UrlSeen, "stale", "1", now - ChronoDuration::hours(200));
        store.put_at(CacheKind::Translation, "stale", "t", now - ChronoDuration::hours(200));
        store.put(CacheKind::UrlSeen, "fresh", "1");

        let removed = store.purge(Duration::from_secs(168 * 3600)).await;
        assert_eq!(removed, 2);
        assert!(store.contains(CacheKind::UrlSeen, "fresh"));
        assert!(!store.contains(CacheKind::Translation, "stale"));
    }

    #[tokio::test]
    async fn flush_failure_degrades_to_memory() {
        let backend = Arc::new(FailingBackend {
            upserts: AtomicUsize::new(0),
        });
        let store = CacheStore::with_backend(backend.clone(), &settings(0)).await;
        assert!(store.is_persistent());

        store.put(CacheKind::UrlSeen, "a", "1");
        store.flush().await;
        assert!(!store.is_persistent());

        // still usable, and the broken backend is not called again
        store.put(CacheKind::UrlSeen, "b", "1");
        store.flush().await;
        assert_eq!(backend.upserts.load(Ordering::SeqCst), 1);
        assert_eq!(store.lookup(CacheKind::UrlSeen, "a").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn flush_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(0);
        settings.path = dir.path().join("nested").join("cache.sqlite3");

        let store = CacheStore::open(&settings).await;
        assert!(store.is_persistent());
        store.put(CacheKind::UrlSeen, "x:1", "1");
        store.put(CacheKind::Summary, "fp", "{}");
        assert_eq!(store.flush().await, 2);
        assert_eq!(store.flush().await, 0);

        let reopened = CacheStore::open(&settings).await;
        assert!(reopened.contains(CacheKind::UrlSeen, "x:1"));
        assert_eq!(reopened.lookup(CacheKind::Summary, "fp").as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn partial_flush_keeps_other_kinds_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(0);
        settings.path = dir.path().join("cache.sqlite3");

        let store = CacheStore::open(&settings).await;
        store.put(CacheKind::UrlSeen, "x:1", "1");
        store.put(CacheKind::Summary, "fp", "{}");
        assert_eq!(store.flush_kinds(&[CacheKind::Summary]).await, 1);

        let reopened = CacheStore::open(&settings).await;
        assert!(!reopened.contains(CacheKind::UrlSeen, "x:1"));
        assert!(reopened.contains(CacheKind::Summary, "fp"));

        // the url entry is still pending in the first store
        assert_eq!(store.flush().await, 1);
        let reopened = CacheStore::open(&settings).await;
        assert!(reopened.contains(CacheKind::UrlSeen, "x:1"));
    }

    #[tokio::test]
    async fn concurrent_puts_keep_counts_consistent() {
        let store = Arc::new(CacheStore::in_memory(0));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    // every worker writes the shared keys plus its own
                    store.put(CacheKind::UrlSeen, &format!("shared-{i}"), "1");
                    store.put(CacheKind::UrlSeen, &format!("w{worker}-{i}"), "1");
                    store.lookup(CacheKind::UrlSeen, &format!("shared-{i}"));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.stats().url_seen, 100 + 8 * 100);
    }
}
