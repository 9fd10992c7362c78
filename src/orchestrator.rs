use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::collector::{CollectorSettings, SourceCollector};
use crate::error::FetchError;
use crate::fetch::FetcherRegistry;
use crate::models::{CollectionResult, CollectionResults, CollectionStats, SourceDescriptor, Termination};

/// Runs one collector per source on a fixed-size worker pool.
pub struct Orchestrator {
    registry: FetcherRegistry,
    cache: Arc<CacheStore>,
    settings: Arc<CollectorSettings>,
}

impl Orchestrator {
    pub fn new(registry: FetcherRegistry, cache: Arc<CacheStore>, settings: CollectorSettings) -> Self {
        Self {
            registry,
            cache,
            settings: Arc::new(settings),
        }
    }

    /// Collect every source, at most `worker_count` at a time. Returns one
    /// result per distinct source URL, even when collectors fail or panic.
    pub async fn run(
        &self,
        sources: &[SourceDescriptor],
        worker_count: usize,
        cancel: &CancellationToken,
    ) -> CollectionResults {
        let sources = unique_sources(sources);
        let workers = worker_count.max(1);
        tracing::info!(sources = sources.len(), workers, "starting collection");

        let gate = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for source in sources.iter().cloned() {
            let client = self.registry.get(source.platform);
            let gate = gate.clone();
            let cache = self.cache.clone();
            let settings = self.settings.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return failed(source, FetchError::Permanent("worker pool closed".into()));
                };
                if cancel.is_cancelled() {
                    return not_started(source);
                }
                let Some(client) = client else {
                    let err = FetchError::Permanent(format!("no fetcher for platform {}", source.platform));
                    return failed(source, err);
                };

                let collector = SourceCollector::new(client.as_ref(), &cache, &settings);
                let outcome = AssertUnwindSafe(collector.collect(&source, &cancel))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(source = %source.url, panic = %message, "collector panicked");
                        failed(source, FetchError::Permanent(format!("collector panicked: {}", message)))
                    }
                }
            });
        }

        let mut results = CollectionResults::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    results.insert(result);
                }
                Err(e) => tracing::error!(error = %e, "collector task failed"),
            }
        }

        for source in sources {
            if results.get(&source.url).is_none() {
                let err = FetchError::Permanent("collector task did not report".into());
                results.insert(failed(source, err));
            }
        }

        tracing::info!(
            sources = results.len(),
            posts = results.total_posts(),
            failed = results.failed().count(),
            "collection finished"
        );
        results
    }
}

/// First occurrence wins; later duplicates are dropped with a warning.
fn unique_sources(sources: &[SourceDescriptor]) -> Vec<SourceDescriptor> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|s| {
            let fresh = seen.insert(s.url.clone());
            if !fresh {
                tracing::warn!(url = %s.url, "duplicate source ignored");
            }
            fresh
        })
        .cloned()
        .collect()
}

fn failed(source: SourceDescriptor, error: FetchError) -> CollectionResult {
    CollectionResult {
        source,
        posts: Vec::new(),
        error: Some(error),
        attempts: 0,
        termination: Termination::Exhausted,
        stats: CollectionStats::default(),
    }
}

fn not_started(source: SourceDescriptor) -> CollectionResult {
    CollectionResult {
        source,
        posts: Vec::new(),
        error: None,
        attempts: 0,
        termination: Termination::Cancelled,
        stats: CollectionStats::default(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
