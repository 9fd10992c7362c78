use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::ai::SummarizerSettings;
use crate::cache::CacheSettings;
use crate::collector::{CollectorSettings, RetryPolicy};
use crate::error::{AppError, Result};
use crate::fetch::FetchSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_path: String,
    pub anthropic_api_key: Option<String>,

    /// Base URL of the RSS bridge that serves platform timelines.
    pub bridge_url: String,
    pub keywords: Vec<String>,
    /// Also drop X posts that miss every keyword. Instagram and Facebook
    /// posts are always filtered when keywords are set.
    pub x_keyword_filter: bool,

    pub lookback_hours: u32,
    pub include_unknown_time: bool,
    pub workers: usize,
    pub limit_per_source: usize,
    pub instagram_candidate_multiplier: usize,
    pub no_growth_break_limit: u32,
    pub old_post_break_limit: u32,
    pub collector_retries: u32,
    pub collector_retry_base_ms: u64,
    pub retry_jitter: bool,
    pub request_timeout_secs: u64,
    pub run_timeout_secs: Option<u64>,

    pub cache_enabled: bool,
    pub cache_window_hours: u32,
    pub cache_max_urls: usize,

    pub ai_enabled: bool,
    pub ai_model: String,
    pub ai_retries: u32,
    pub ai_retry_base_ms: u64,
    pub ai_concurrency: usize,
    pub target_language: String,
}

fn default_cache_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sns-digest");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("pipeline_cache.sqlite3").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            anthropic_api_key: None,
            bridge_url: "https://rsshub.app".to_string(),
            keywords: Vec::new(),
            x_keyword_filter: false,
            lookback_hours: 24,
            include_unknown_time: false,
            workers: 3,
            limit_per_source: 20,
            instagram_candidate_multiplier: 4,
            no_growth_break_limit: 2,
            old_post_break_limit: 8,
            collector_retries: 2,
            collector_retry_base_ms: 800,
            retry_jitter: true,
            request_timeout_secs: 25,
            run_timeout_secs: None,
            cache_enabled: true,
            cache_window_hours: 168,
            cache_max_urls: 200_000,
            ai_enabled: true,
            ai_model: crate::ai::claude::DEFAULT_MODEL.to_string(),
            ai_retries: 1,
            ai_retry_base_ms: 1000,
            ai_concurrency: 2,
            target_language: "English".to_string(),
        }
    }
}

impl Config {
    /// Load from an explicit file, or from the default location (created with
    /// defaults on first run).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let content = std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            return Ok(toml::from_str(&content)?);
        }

        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sns-digest")
            .join("config.toml")
    }

    /// Apply environment overrides. Invalid values are ignored with a warning.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
            let raw = get(name)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(var = name, value = %raw, "ignoring invalid environment value");
                    None
                }
            }
        }

        if let Some(v) = parsed(&get, "LOOKBACK_HOURS") {
            self.lookback_hours = v;
        }
        if let Some(v) = parsed(&get, "COLLECT_WORKERS") {
            self.workers = v;
        }
        if let Some(v) = parsed(&get, "CACHE_WINDOW_HOURS") {
            self.cache_window_hours = v;
        }
        if let Some(v) = parsed(&get, "CACHE_MAX_URLS") {
            self.cache_max_urls = v;
        }
        if let Some(v) = parsed(&get, "NO_GROWTH_BREAK_LIMIT") {
            self.no_growth_break_limit = v;
        }
        if let Some(v) = parsed(&get, "OLD_POST_BREAK_LIMIT") {
            self.old_post_break_limit = v;
        }
        if let Some(v) = parsed(&get, "COLLECTOR_RETRIES") {
            self.collector_retries = v;
        }
        if let Some(v) = parsed(&get, "COLLECTOR_RETRY_BASE_MS") {
            self.collector_retry_base_ms = v;
        }
        if let Some(v) = parsed(&get, "X_KEYWORD_FILTER") {
            self.x_keyword_filter = v;
        }
        if let Some(v) = parsed(&get, "INSTAGRAM_CANDIDATE_MULTIPLIER") {
            self.instagram_candidate_multiplier = v;
        }
        if let Some(v) = get("CACHE_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.cache_path = v;
        }
        if let Some(v) = get("RSS_BRIDGE_URL").filter(|v| !v.trim().is_empty()) {
            self.bridge_url = v;
        }
        if let Some(v) = get("SEARCH_KEYWORDS") {
            self.keywords = split_keywords(&v);
        }
        if let Some(v) = get("ANTHROPIC_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.anthropic_api_key = Some(v);
        }
    }

    /// Freeze into the immutable per-run configuration, clamping values the
    /// same way regardless of where they came from.
    pub fn to_run_config(&self) -> RunConfig {
        let retry = RetryPolicy {
            max_retries: self.collector_retries,
            base_delay: Duration::from_millis(self.collector_retry_base_ms.max(100)),
            jitter: self.retry_jitter,
        };

        let ai_enabled = self.ai_enabled
            && self
                .anthropic_api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());

        RunConfig {
            workers: self.workers.max(1),
            collector: CollectorSettings {
                lookback: hours(self.lookback_hours),
                limit_per_source: self.limit_per_source.max(1),
                no_growth_break_limit: self.no_growth_break_limit,
                old_post_break_limit: self.old_post_break_limit,
                include_unknown_time: self.include_unknown_time,
                retry,
            },
            fetch: FetchSettings {
                bridge_url: self.bridge_url.trim_end_matches('/').to_string(),
                keywords: self.keywords.clone(),
                x_keyword_filter: self.x_keyword_filter,
                instagram_candidate_multiplier: self.instagram_candidate_multiplier.max(1),
                request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            },
            cache: CacheSettings {
                enabled: self.cache_enabled,
                path: PathBuf::from(&self.cache_path),
                window: hours(self.cache_window_hours),
                max_url_entries: self.cache_max_urls,
            },
            summarizer: SummarizerSettings {
                ai_enabled,
                retry: RetryPolicy {
                    max_retries: self.ai_retries,
                    base_delay: Duration::from_millis(self.ai_retry_base_ms.max(100)),
                    jitter: self.retry_jitter,
                },
                concurrency: self.ai_concurrency.max(1),
                target_language: self.target_language.clone(),
            },
            run_timeout: self.run_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
        }
    }
}

/// Zero hours means "no limit" for lookback and cache windows.
fn hours(h: u32) -> Option<Duration> {
    if h == 0 {
        None
    } else {
        Some(Duration::from_secs(u64::from(h) * 3600))
    }
}

pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Everything the core needs for one run. Built once, passed explicitly.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workers: usize,
    pub collector: CollectorSettings,
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
    pub summarizer: SummarizerSettings,
    pub run_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LOOKBACK_HOURS", "48"),
            ("COLLECT_WORKERS", "not-a-number"),
            ("SEARCH_KEYWORDS", " gpu, ,llm "),
            ("CACHE_DB_PATH", ""),
            ("X_KEYWORD_FILTER", "true"),
        ]);
        let mut config = Config {
            cache_path: "keep.sqlite3".into(),
            ..Config::default()
        };
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.lookback_hours, 48);
        assert_eq!(config.workers, 3);
        assert_eq!(config.keywords, vec!["gpu".to_string(), "llm".to_string()]);
        assert_eq!(config.cache_path, "keep.sqlite3");
        assert!(config.x_keyword_filter);
    }

    #[test]
    fn ai_retries_less_than_collector() {
        let run = Config::default().to_run_config();
        assert_eq!(run.summarizer.retry.max_retries, 1);
        assert!(run.summarizer.retry.max_retries < run.collector.retry.max_retries);
        assert!(!run.fetch.x_keyword_filter);
    }

    #[test]
    fn run_config_clamps_values() {
        let config = Config {
            workers: 0,
            limit_per_source: 0,
            instagram_candidate_multiplier: 0,
            collector_retry_base_ms: 5,
            lookback_hours: 0,
            cache_window_hours: 24,
            ..Config::default()
        };
        let run = config.to_run_config();

        assert_eq!(run.workers, 1);
        assert_eq!(run.collector.limit_per_source, 1);
        assert_eq!(run.fetch.instagram_candidate_multiplier, 1);
        assert_eq!(run.collector.retry.base_delay, Duration::from_millis(100));
        assert_eq!(run.collector.lookback, None);
        assert_eq!(run.cache.window, Some(Duration::from_secs(24 * 3600)));
    }

    #[test]
    fn ai_needs_an_api_key() {
        let without_key = Config {
            ai_enabled: true,
            anthropic_api_key: None,
            ..Config::default()
        };
        assert!(!without_key.to_run_config().summarizer.ai_enabled);

        let with_key = Config {
            anthropic_api_key: Some("sk-test".into()),
            ..Config::default()
        };
        assert!(with_key.to_run_config().summarizer.ai_enabled);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str("workers = 7\nkeywords = [\"chip\"]\n").unwrap();
        assert_eq!(config.workers, 7);
        assert_eq!(config.keywords, vec!["chip".to_string()]);
        assert_eq!(config.old_post_break_limit, 8);
    }
}
