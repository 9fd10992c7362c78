use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKind, CacheStore};
use crate::collector::sleep_or_cancel;
use crate::error::AiError;
use crate::models::{Category, RawPost, SummarizedPost, SummarySource};

use super::prompt::{build_prompt, parse_response, AiSummary};
use super::rules::{clean_text, fingerprint, rule_category, rule_summary};
use super::{AiBackend, SummarizerSettings};

/// Value stored under [`CacheKind::Summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSummary {
    summary: String,
    category: Category,
    source: SummarySource,
}

pub struct Summarizer {
    backend: Option<Arc<dyn AiBackend>>,
    cache: Arc<CacheStore>,
    settings: SummarizerSettings,
    gate: Semaphore,
    warned: AtomicBool,
    failures: AtomicUsize,
}

impl Summarizer {
    pub fn new(
        backend: Option<Arc<dyn AiBackend>>,
        cache: Arc<CacheStore>,
        settings: SummarizerSettings,
    ) -> Self {
        let gate = Semaphore::new(settings.concurrency.max(1));
        Self {
            backend,
            cache,
            settings,
            gate,
            warned: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
        }
    }

    fn ai(&self) -> Option<&dyn AiBackend> {
        if self.settings.ai_enabled {
            self.backend.as_deref()
        } else {
            None
        }
    }

    /// Always produces a summary: cache, then AI, then rules.
    pub async fn summarize(&self, post: RawPost, cancel: &CancellationToken) -> SummarizedPost {
        let text = clean_text(&post.text);
        let key = fingerprint(&text);

        if let Some((cached, translation)) = self.cached(&key) {
            return SummarizedPost {
                post,
                summary: cached.summary,
                translation,
                category: cached.category,
                summary_source: SummarySource::Cache,
            };
        }

        let (summary, translation) = match self.ai() {
            Some(ai) if !cancel.is_cancelled() => match self.ask(ai, &text, cancel).await {
                Ok(parsed) => ai_result(parsed, &text),
                Err(_) if cancel.is_cancelled() => rule_result(&text),
                Err(err) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    self.warn_once(ai.name(), &err);
                    rule_result(&text)
                }
            },
            _ => rule_result(&text),
        };

        if let Ok(value) = serde_json::to_string(&summary) {
            self.cache.put(CacheKind::Summary, &key, &value);
            self.cache.put(CacheKind::Translation, &key, &translation);
        }

        SummarizedPost {
            post,
            summary: summary.summary,
            translation,
            category: summary.category,
            summary_source: summary.source,
        }
    }

    /// Summarize a batch with at most `concurrency` posts in flight, then
    /// persist the new summaries and translations. Output order is not the
    /// input order.
    pub async fn summarize_all(
        &self,
        posts: Vec<RawPost>,
        cancel: &CancellationToken,
    ) -> Vec<SummarizedPost> {
        let total = posts.len();
        let results: Vec<SummarizedPost> = stream::iter(posts)
            .map(|post| self.summarize(post, cancel))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        self.cache
            .flush_kinds(&[CacheKind::Summary, CacheKind::Translation])
            .await;

        let ai = results
            .iter()
            .filter(|p| p.summary_source == SummarySource::Ai)
            .count();
        let cached = results
            .iter()
            .filter(|p| p.summary_source == SummarySource::Cache)
            .count();
        tracing::info!(total, ai, cached, rule = total - ai - cached, "summarized posts");
        results
    }

    /// Posts that fell back to a rule summary because the AI request failed.
    /// Cancelled requests are not counted.
    pub fn ai_failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// A full hit needs both the summary and the translation. Rule summaries
    /// do not count as hits while AI is available.
    fn cached(&self, key: &str) -> Option<(CachedSummary, String)> {
        let raw = self.cache.lookup(CacheKind::Summary, key)?;
        let cached: CachedSummary = serde_json::from_str(&raw).ok()?;
        if cached.source == SummarySource::Rule && self.ai().is_some() {
            return None;
        }
        let translation = self.cache.lookup(CacheKind::Translation, key)?;
        Some((cached, translation))
    }

    /// One AI summary with backoff on retryable errors. Malformed and
    /// permanent errors return immediately.
    async fn ask(
        &self,
        ai: &dyn AiBackend,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<AiSummary, AiError> {
        let prompt = build_prompt(text, &self.settings.target_language);
        let mut retries = 0u32;

        loop {
            let result = {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(cancelled()),
                    permit = self.gate.acquire() => permit
                        .map_err(|_| AiError::Permanent("summarizer closed".to_string()))?,
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(cancelled()),
                    raw = ai.complete(&prompt) => raw.and_then(|raw| parse_response(&raw)),
                }
            };

            match result {
                Ok(parsed) => return Ok(parsed),
                Err(err) if err.is_retryable() && self.settings.retry.can_retry(retries + 1) => {
                    retries += 1;
                    let delay = self.settings.retry.delay_for_retry(retries);
                    tracing::debug!(
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "AI request failed; backing off"
                    );
                    if !sleep_or_cancel(delay, cancel).await {
                        return Err(cancelled());
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn warn_once(&self, backend: &str, err: &AiError) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(backend, error = %err, "AI summary failed; using rule-based fallback");
        } else {
            tracing::debug!(backend, error = %err, "AI summary failed");
        }
    }
}

fn cancelled() -> AiError {
    AiError::Permanent("cancelled".to_string())
}

fn rule_result(text: &str) -> (CachedSummary, String) {
    let summary = CachedSummary {
        summary: rule_summary(text),
        category: rule_category(text),
        source: SummarySource::Rule,
    };
    (summary, text.to_string())
}

fn ai_result(parsed: AiSummary, text: &str) -> (CachedSummary, String) {
    let category = Category::parse(&parsed.category).unwrap_or_else(|| rule_category(text));
    let translation = if parsed.translation.is_empty() {
        text.to_string()
    } else {
        parsed.translation
    };
    let summary = CachedSummary {
        summary: parsed.summary,
        category,
        source: SummarySource::Ai,
    };
    (summary, translation)
}
