pub const SCHEMA: &str = r#"
-- one row per (kind, key); timestamps are fixed-width RFC 3339 UTC strings
CREATE TABLE IF NOT EXISTS cache_entries (
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    PRIMARY KEY (kind, key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_kind_seen ON cache_entries(kind, last_seen_at);
CREATE INDEX IF NOT EXISTS idx_cache_entries_seen ON cache_entries(last_seen_at);
"#;
