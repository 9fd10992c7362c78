use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::CacheError;

use super::schema::SCHEMA;
use super::{CacheBackend, CacheEntry, CacheKind};

/// SQLite-backed cache. The connection lives on `tokio-rusqlite`'s
/// background thread, so all statements are serialized through it.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub async fn open(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    pub async fn count(&self, kind: CacheKind) -> Result<usize, CacheError> {
        let kind = kind.as_str();
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE kind = ?1",
                    params![kind],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn load(
        &self,
        since: Option<DateTime<Utc>>,
        max_url_entries: usize,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let since = since.map(format_ts);
        // LIMIT -1 is "no limit" in SQLite
        let limit: i64 = if max_url_entries == 0 {
            -1
        } else {
            i64::try_from(max_url_entries).unwrap_or(i64::MAX)
        };

        let entries = self
            .conn
            .call(move |conn| {
                let mut entries = Vec::new();

                let mut stmt = conn.prepare(
                    r#"SELECT kind, key, value, created_at, last_seen_at
                       FROM cache_entries
                       WHERE kind = 'url_seen' AND (?1 IS NULL OR last_seen_at >= ?1)
                       ORDER BY last_seen_at DESC
                       LIMIT ?2"#,
                )?;
                let urls = stmt.query_map(params![since, limit], entry_from_row)?;
                for entry in urls {
                    entries.extend(entry?);
                }

                let mut stmt = conn.prepare(
                    r#"SELECT kind, key, value, created_at, last_seen_at
                       FROM cache_entries
                       WHERE kind != 'url_seen' AND (?1 IS NULL OR last_seen_at >= ?1)"#,
                )?;
                let others = stmt.query_map(params![since], entry_from_row)?;
                for entry in others {
                    entries.extend(entry?);
                }

                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    async fn upsert(&self, entries: Vec<CacheEntry>) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        r#"INSERT INTO cache_entries (kind, key, value, created_at, last_seen_at)
                           VALUES (?1, ?2, ?3, ?4, ?5)
                           ON CONFLICT(kind, key) DO UPDATE SET
                               value = excluded.value,
                               last_seen_at = MAX(last_seen_at, excluded.last_seen_at)"#,
                    )?;
                    for entry in &entries {
                        stmt.execute(params![
                            entry.kind.as_str(),
                            entry.key,
                            entry.value,
                            format_ts(entry.created_at),
                            format_ts(entry.last_seen_at),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        let cutoff = format_ts(cutoff);
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM cache_entries WHERE last_seen_at < ?1",
                    params![cutoff],
                )?;
                Ok(n)
            })
            .await?;
        Ok(removed)
    }

    async fn enforce_url_cap(&self, max: usize) -> Result<usize, CacheError> {
        if max == 0 {
            return Ok(0);
        }
        let max = i64::try_from(max).unwrap_or(i64::MAX);
        let removed = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE kind = 'url_seen'",
                    [],
                    |row| row.get(0),
                )?;
                let excess = count - max;
                if excess <= 0 {
                    return Ok(0);
                }
                let n = conn.execute(
                    r#"DELETE FROM cache_entries
                       WHERE kind = 'url_seen' AND key IN (
                           SELECT key FROM cache_entries
                           WHERE kind = 'url_seen'
                           ORDER BY last_seen_at ASC, key ASC
                           LIMIT ?1
                       )"#,
                    params![excess],
                )?;
                Ok(n)
            })
            .await?;
        Ok(removed)
    }
}

/// Fixed-width UTC format so that string order matches time order.
pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000000Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Rows with an unknown kind or unreadable timestamps are skipped.
fn entry_from_row(row: &Row) -> rusqlite::Result<Option<CacheEntry>> {
    let kind: String = row.get(0)?;
    let created_at: String = row.get(3)?;
    let last_seen_at: String = row.get(4)?;

    let (Some(kind), Some(created_at), Some(last_seen_at)) = (
        CacheKind::parse(&kind),
        parse_datetime(&created_at),
        parse_datetime(&last_seen_at),
    ) else {
        return Ok(None);
    };

    Ok(Some(CacheEntry {
        kind,
        key: row.get(1)?,
        value: row.get(2)?,
        created_at,
        last_seen_at,
    }))
}
