//! Summaries, translations and topic labels for collected posts.

pub mod claude;
mod prompt;
pub mod rules;
mod summarizer;

use std::time::Duration;

use async_trait::async_trait;

use crate::collector::RetryPolicy;
use crate::error::AiError;

pub use claude::ClaudeClient;
pub use prompt::{build_prompt, parse_response, AiSummary};
pub use summarizer::Summarizer;

/// A text-completion service.
#[async_trait]
pub trait AiBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// False when disabled by flag or when no API key is configured.
    pub ai_enabled: bool,
    pub retry: RetryPolicy,
    /// Concurrent in-flight AI requests, independent of the worker count.
    pub concurrency: usize,
    pub target_language: String,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            ai_enabled: false,
            retry: RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_secs(1),
                jitter: true,
            },
            concurrency: 2,
            target_language: "English".to_string(),
        }
    }
}
