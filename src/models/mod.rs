mod collection;
mod post;
mod source;
mod summary;

pub use collection::{CollectionResult, CollectionResults, CollectionStats, EarlyStopReason, Termination};
pub use post::{normalize_url, RawPost};
pub use source::{Platform, SourceDescriptor};
pub use summary::{Category, SummarizedPost, SummarySource};
