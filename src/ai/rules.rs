//! Deterministic text handling: cleaning, fingerprints, and the rule-based
//! summary used whenever the AI backend is off or failing.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::Category;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+|www\.\S+").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?\n]").expect("valid regex"));

pub const MAX_RULE_SUMMARY_CHARS: usize = 500;
pub const EMPTY_SUMMARY: &str = "(no content)";

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Ai, &["ai", "llm", "agent", "model", "gemini", "gpt"]),
    (Category::Semiconductor, &["chip", "gpu", "npu", "hbm", "fab", "wafer"]),
    (Category::Mobile, &["mobile", "smartphone", "android", "ios", "app"]),
    (Category::Cloud, &["cloud", "aws", "azure", "gcp", "saas"]),
    (Category::Network, &["network", "5g", "telecom"]),
];

/// Strip URLs and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, " ");
    WHITESPACE_RE.replace_all(&without_urls, " ").trim().to_string()
}

/// Cache key for summaries and translations.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(clean_text(text).as_bytes()))
}

/// First three sentence chunks joined by ` / `, at most 500 characters.
pub fn rule_summary(text: &str) -> String {
    let chunks: Vec<&str> = SENTENCE_RE
        .split(text)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .take(3)
        .collect();

    if chunks.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }
    chunks.join(" / ").chars().take(MAX_RULE_SUMMARY_CHARS).collect()
}

/// Substring match against a fixed keyword table; first category wins.
pub fn rule_category(text: &str) -> Category {
    let lowered = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_drops_urls_and_whitespace() {
        assert_eq!(
            clean_text("  New model\n\nout now https://t.co/abc  www.example.com/x  "),
            "New model out now"
        );
    }

    #[test]
    fn fingerprint_ignores_urls_and_spacing() {
        assert_eq!(
            fingerprint("Launch day!  https://a.example/1"),
            fingerprint("Launch day! https://b.example/2")
        );
        assert_ne!(fingerprint("Launch day!"), fingerprint("launch day!"));
        assert_eq!(fingerprint("x").len(), 64);
    }

    #[test]
    fn rule_summary_takes_three_chunks() {
        assert_eq!(
            rule_summary("One. Two! Three? Four."),
            "One / Two / Three"
        );
        assert_eq!(rule_summary("  ...  "), EMPTY_SUMMARY);
        assert_eq!(rule_summary(""), EMPTY_SUMMARY);

        let long = "가".repeat(800);
        assert_eq!(rule_summary(&long).chars().count(), MAX_RULE_SUMMARY_CHARS);
    }

    #[test]
    fn category_table_in_order() {
        assert_eq!(rule_category("New GPT release"), Category::Ai);
        assert_eq!(rule_category("HBM supply for the next GPU"), Category::Semiconductor);
        assert_eq!(rule_category("AWS region outage"), Category::Cloud);
        assert_eq!(rule_category("5G rollout"), Category::Network);
        assert_eq!(rule_category("Weekend bake sale"), Category::Other);
    }
}
