use std::fmt;

use serde::{Deserialize, Serialize};

use super::RawPost;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Ai,
    Rule,
    Cache,
}

impl SummarySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummarySource::Ai => "ai",
            SummarySource::Rule => "rule",
            SummarySource::Cache => "cache",
        }
    }
}

impl fmt::Display for SummarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic label attached to each summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "AI")]
    Ai,
    Semiconductor,
    Mobile,
    Cloud,
    Network,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Ai,
        Category::Semiconductor,
        Category::Mobile,
        Category::Cloud,
        Category::Network,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ai => "AI",
            Category::Semiconductor => "Semiconductor",
            Category::Mobile => "Mobile",
            Category::Cloud => "Cloud",
            Category::Network => "Network",
            Category::Other => "Other",
        }
    }

    /// Lenient parse used on AI output; unknown labels map to `None`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizedPost {
    #[serde(flatten)]
    pub post: RawPost,
    pub summary: String,
    pub translation: String,
    pub category: Category,
    pub summary_source: SummarySource,
}
