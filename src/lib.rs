//! Social post digest: concurrent collection with cross-run caching,
//! AI or rule-based summaries, and a merged JSON report.

pub mod ai;
pub mod cache;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod sources;

pub use config::{Config, RunConfig};
pub use error::{AppError, Result};
pub use pipeline::{Pipeline, RunSummary};
