use std::collections::HashSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::SummarizedPost;

/// Rotated copies of the previous report kept next to it.
const BACKUPS: usize = 3;
/// Attempts at replacing the report while another process holds it.
const WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Rows added by this run.
    pub added: usize,
    /// Rows in the report after the write.
    pub total: usize,
}

/// Consumer of the final record set.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write(&self, posts: &[SummarizedPost]) -> Result<ReportOutcome>;
}

/// Pretty-printed JSON array, newest first. Rows already present in an
/// existing report are kept; only posts with new URLs are appended.
///
/// The report is replaced through a temporary file and a rename, so readers
/// see either the old or the new array. The previous version is kept as
/// `<name>.bak.1`, older ones shift up to `<name>.bak.3`.
pub struct JsonReportWriter {
    path: PathBuf,
}

impl JsonReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<name><suffix>` in the report's directory.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("report"));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    pub fn backup_path(&self, n: usize) -> PathBuf {
        self.sibling(&format!(".bak.{n}"))
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn read_existing(&self) -> Result<Vec<SummarizedPost>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Shift `.bak.N` up by one and copy the current report to `.bak.1`.
    /// A failed rotation is logged and the write goes ahead.
    async fn rotate_backups(&self) {
        if !self.path.exists() {
            return;
        }
        for n in (1..BACKUPS).rev() {
            let from = self.backup_path(n);
            if !from.exists() {
                continue;
            }
            if let Err(e) = tokio::fs::rename(&from, self.backup_path(n + 1)).await {
                tracing::warn!(path = %from.display(), error = %e, "cannot rotate report backup");
            }
        }
        if let Err(e) = tokio::fs::copy(&self.path, self.backup_path(1)).await {
            tracing::warn!(path = %self.path.display(), error = %e, "cannot back up report");
        }
    }

    async fn replace(&self, content: &str) -> std::io::Result<()> {
        let tmp = self.temp_path();
        let mut attempt = 1;
        loop {
            let result = match tokio::fs::write(&tmp, content).await {
                Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::PermissionDenied && attempt < WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, error = %e, "report locked; retrying");
                    attempt += 1;
                    tokio::time::sleep(WRITE_RETRY_DELAY).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl ReportSink for JsonReportWriter {
    async fn write(&self, posts: &[SummarizedPost]) -> Result<ReportOutcome> {
        let mut rows = self.read_existing()?;
        let mut seen: HashSet<String> = rows.iter().map(|r| r.post.dedup_key()).collect();

        let before = rows.len();
        for post in posts {
            if seen.insert(post.post.dedup_key()) {
                rows.push(post.clone());
            }
        }
        let added = rows.len() - before;

        // newest first, undated rows last
        rows.sort_by(|a, b| {
            b.post
                .published_at
                .cmp(&a.post.published_at)
                .then_with(|| a.post.url.cmp(&b.post.url))
        });

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&rows)?;
        self.rotate_backups().await;
        self.replace(&content).await?;

        tracing::info!(path = %self.path.display(), added, total = rows.len(), "report written");
        Ok(ReportOutcome {
            added,
            total: rows.len(),
        })
    }
}
