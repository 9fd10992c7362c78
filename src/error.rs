use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Async database error: {0}")]
    AsyncDatabase(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source list error: {0}")]
    Sources(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised while scanning a source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failures, timeouts, 5xx and 429 responses, unparseable feeds.
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Retrying cannot help: bad source URL, unsupported platform, 4xx.
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status)
                if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS =>
            {
                FetchError::Permanent(err.to_string())
            }
            _ => FetchError::Transient(err.to_string()),
        }
    }
}

impl From<feed_rs::parser::ParseFeedError> for FetchError {
    fn from(err: feed_rs::parser::ParseFeedError) -> Self {
        FetchError::Transient(format!("feed parse: {}", err))
    }
}

/// Errors returned by an AI completion backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// Timeouts, rate limits, overloaded upstream.
    #[error("retryable AI error: {0}")]
    Retryable(String),

    /// Authentication or request errors.
    #[error("permanent AI error: {0}")]
    Permanent(String),

    /// The backend answered, but not in the expected shape.
    #[error("malformed AI response: {0}")]
    Malformed(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::Retryable(_))
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return AiError::Retryable(err.to_string());
        }
        if err.is_decode() {
            return AiError::Malformed(err.to_string());
        }
        match err.status() {
            Some(status)
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS =>
            {
                AiError::Retryable(err.to_string())
            }
            _ => AiError::Permanent(err.to_string()),
        }
    }
}

/// Failures of the persistent cache backend. The store degrades to
/// memory-only when it sees one of these.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] tokio_rusqlite::Error),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Database(tokio_rusqlite::Error::Rusqlite(err))
    }
}
