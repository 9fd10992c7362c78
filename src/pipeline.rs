use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::ai::rules::clean_text;
use crate::ai::{AiBackend, ClaudeClient, Summarizer};
use crate::cache::{CacheStats, CacheStore};
use crate::config::RunConfig;
use crate::error::Result;
use crate::fetch::FetcherRegistry;
use crate::models::{normalize_url, CollectionResults, RawPost, SourceDescriptor, Termination};
use crate::orchestrator::Orchestrator;
use crate::report::{ReportOutcome, ReportSink};

/// End-of-run numbers, logged once the report is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub succeeded: usize,
    pub early_stopped: usize,
    pub exhausted: usize,
    pub cancelled: usize,
    pub collected: usize,
    pub unique: usize,
    pub report_added: usize,
    pub report_total: usize,
    /// Posts whose AI summary failed and fell back to rules.
    pub ai_failures: usize,
    pub cache: CacheStats,
    /// `(source url, error)` for every source that ended with an error.
    pub errors: Vec<(String, String)>,
}

impl RunSummary {
    fn from_results(results: &CollectionResults) -> Self {
        let mut summary = Self {
            sources: results.len(),
            collected: results.total_posts(),
            ..Self::default()
        };
        for result in results.iter() {
            match result.termination {
                Termination::Succeeded => summary.succeeded += 1,
                Termination::EarlyStopped(_) => summary.early_stopped += 1,
                Termination::Exhausted => summary.exhausted += 1,
                Termination::Cancelled => summary.cancelled += 1,
            }
            if let Some(err) = &result.error {
                summary.errors.push((result.source.url.clone(), err.to_string()));
            }
        }
        summary
    }

    pub fn log(&self) {
        tracing::info!(
            sources = self.sources,
            succeeded = self.succeeded,
            early_stopped = self.early_stopped,
            exhausted = self.exhausted,
            cancelled = self.cancelled,
            collected = self.collected,
            unique = self.unique,
            report_added = self.report_added,
            report_total = self.report_total,
            ai_failures = self.ai_failures,
            cached_urls = self.cache.url_seen,
            cached_summaries = self.cache.summaries,
            persistent_cache = self.cache.persistent,
            "run finished"
        );
        for (url, error) in &self.errors {
            tracing::warn!(source = %url, error = %error, "source failed");
        }
    }
}

pub struct Pipeline {
    config: RunConfig,
    cache: Arc<CacheStore>,
    orchestrator: Orchestrator,
    summarizer: Summarizer,
}

impl Pipeline {
    /// Wire the production services: SQLite cache, RSS-bridge fetchers and,
    /// when a key is configured, the Claude backend.
    pub async fn build(config: RunConfig, api_key: Option<&str>, model: &str) -> Result<Self> {
        let cache = Arc::new(CacheStore::open(&config.cache).await);
        let registry = FetcherRegistry::from_settings(&config.fetch)?;

        let ai: Option<Arc<dyn AiBackend>> = match api_key {
            Some(key) if config.summarizer.ai_enabled => Some(Arc::new(ClaudeClient::new(key, model)?)),
            _ => None,
        };
        if ai.is_none() {
            tracing::info!("AI summaries disabled; using rule-based summaries");
        }

        Ok(Self::new(config, registry, cache, ai))
    }

    pub fn new(
        config: RunConfig,
        registry: FetcherRegistry,
        cache: Arc<CacheStore>,
        ai: Option<Arc<dyn AiBackend>>,
    ) -> Self {
        let orchestrator = Orchestrator::new(registry, cache.clone(), config.collector.clone());
        let summarizer = Summarizer::new(ai, cache.clone(), config.summarizer.clone());
        Self {
            config,
            cache,
            orchestrator,
            summarizer,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Drop cache entries outside the configured window.
    pub async fn purge(&self) -> usize {
        let Some(window) = self.config.cache.window else {
            return 0;
        };
        let removed = self.cache.purge(window).await;
        tracing::info!(removed, window_hours = window.as_secs() / 3600, "cache purged");
        removed
    }

    /// Collect, deduplicate, summarize and report. Source and AI failures
    /// never abort the run; only the report write can fail.
    ///
    /// Seen URLs are persisted only after the report is written, so a failed
    /// write leaves this run's posts eligible for the next one.
    pub async fn run(
        &self,
        sources: &[SourceDescriptor],
        sink: &dyn ReportSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let cancel = cancel.child_token();
        let deadline = self.config.run_timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracing::warn!(timeout_secs = timeout.as_secs(), "run timeout reached; cancelling");
                cancel.cancel();
            })
        });

        self.purge().await;

        let results = self
            .orchestrator
            .run(sources, self.config.workers, &cancel)
            .await;
        let mut summary = RunSummary::from_results(&results);

        let posts = dedup_posts(results.into_posts());
        summary.unique = posts.len();

        let failures_before = self.summarizer.ai_failures();
        let summarized = self.summarizer.summarize_all(posts, &cancel).await;
        summary.ai_failures = self.summarizer.ai_failures() - failures_before;
        if let Some(handle) = deadline {
            handle.abort();
        }

        let ReportOutcome { added, total } = match sink.write(&summarized).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "report write failed; seen posts not persisted");
                return Err(e);
            }
        };
        summary.report_added = added;
        summary.report_total = total;

        self.cache.flush().await;
        summary.cache = self.cache.stats();
        Ok(summary)
    }
}

/// Cross-source dedup: one post per normalized URL and per cleaned text.
/// Posts without a URL or without text are dropped.
pub fn dedup_posts(posts: Vec<RawPost>) -> Vec<RawPost> {
    let mut seen_urls = HashSet::new();
    let mut seen_texts = HashSet::new();

    posts
        .into_iter()
        .filter(|post| {
            if post.url.trim().is_empty() {
                return false;
            }
            let url = normalize_url(&post.url);
            if seen_urls.contains(&url) {
                return false;
            }
            let cleaned = clean_text(&post.text);
            if cleaned.is_empty() {
                return false;
            }
            let digest = format!("{:x}", Sha256::digest(cleaned.to_lowercase().as_bytes()));
            if !seen_texts.insert(digest) {
                return false;
            }
            seen_urls.insert(url);
            true
        })
        .collect()
}
