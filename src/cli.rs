use std::path::PathBuf;

use clap::Parser;

use crate::config::{split_keywords, Config};
use crate::sources::DEFAULT_SOURCES_FILE;

/// Collect recent social posts, summarize them and write a report.
///
/// Flags override the config file and environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source list (TOML, one [[source]] table per account)
    #[arg(long, env = "SOURCES_FILE", default_value = DEFAULT_SOURCES_FILE)]
    pub sources: PathBuf,

    /// Report output path (JSON)
    #[arg(long, short, env = "REPORT_PATH", default_value = "sns_digest.json")]
    pub output: PathBuf,

    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write an example source list and exit
    #[arg(long)]
    pub create_sources: bool,

    /// Purge cache entries outside the cache window and exit
    #[arg(long)]
    pub purge_only: bool,

    /// Concurrent source collectors
    #[arg(long)]
    pub workers: Option<usize>,

    /// Only keep posts newer than this many hours (0 = no limit)
    #[arg(long)]
    pub lookback_hours: Option<u32>,

    #[arg(long)]
    pub limit_per_source: Option<usize>,

    /// Empty fetch iterations in a row before a source is abandoned (0 = off)
    #[arg(long)]
    pub no_growth_break_limit: Option<u32>,

    /// Too-old posts in a row before a source is abandoned (0 = off)
    #[arg(long)]
    pub old_post_break_limit: Option<u32>,

    #[arg(long)]
    pub collector_retries: Option<u32>,

    #[arg(long)]
    pub collector_retry_base_ms: Option<u64>,

    #[arg(long)]
    pub instagram_candidate_multiplier: Option<usize>,

    #[arg(long)]
    pub cache_db: Option<String>,

    #[arg(long)]
    pub cache_window_hours: Option<u32>,

    /// Cap on remembered post URLs (0 = unlimited)
    #[arg(long)]
    pub cache_max_urls: Option<usize>,

    /// Keep everything in memory for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Comma-separated search keywords
    #[arg(long)]
    pub keywords: Option<String>,

    /// Also drop X posts that mention none of the keywords
    #[arg(long)]
    pub x_keyword_filter: bool,

    /// Base URL of the RSS bridge
    #[arg(long)]
    pub bridge_url: Option<String>,

    /// Rule-based summaries only
    #[arg(long)]
    pub no_ai: bool,

    /// Keep posts whose publish time is unknown
    #[arg(long)]
    pub include_unknown_time: bool,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub run_timeout_secs: Option<u64>,

    /// Only log warnings and errors
    #[arg(long, short)]
    pub quiet: bool,
}

impl Cli {
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = self.workers {
            config.workers = v;
        }
        if let Some(v) = self.lookback_hours {
            config.lookback_hours = v;
        }
        if let Some(v) = self.limit_per_source {
            config.limit_per_source = v;
        }
        if let Some(v) = self.no_growth_break_limit {
            config.no_growth_break_limit = v;
        }
        if let Some(v) = self.old_post_break_limit {
            config.old_post_break_limit = v;
        }
        if let Some(v) = self.collector_retries {
            config.collector_retries = v;
        }
        if let Some(v) = self.collector_retry_base_ms {
            config.collector_retry_base_ms = v;
        }
        if let Some(v) = self.instagram_candidate_multiplier {
            config.instagram_candidate_multiplier = v;
        }
        if let Some(v) = &self.cache_db {
            config.cache_path = v.clone();
        }
        if let Some(v) = self.cache_window_hours {
            config.cache_window_hours = v;
        }
        if let Some(v) = self.cache_max_urls {
            config.cache_max_urls = v;
        }
        if let Some(v) = &self.keywords {
            config.keywords = split_keywords(v);
        }
        if let Some(v) = &self.bridge_url {
            config.bridge_url = v.clone();
        }
        if let Some(v) = self.run_timeout_secs {
            config.run_timeout_secs = Some(v);
        }
        if self.no_cache {
            config.cache_enabled = false;
        }
        if self.no_ai {
            config.ai_enabled = false;
        }
        if self.x_keyword_filter {
            config.x_keyword_filter = true;
        }
        if self.include_unknown_time {
            config.include_unknown_time = true;
        }
    }
}
