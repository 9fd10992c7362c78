use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::models::Category;

/// What the model is asked to return. Also the shape stored in the
/// summary cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSummary {
    pub summary: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub category: String,
}

pub fn build_prompt(text: &str, target_language: &str) -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
    format!(
        "Analyze the following social media post.\n\
         1) summary: one or two sentences in {lang} covering the key point\n\
         2) translation: the full post translated into {lang}\n\
         3) category: exactly one of ({cats})\n\
         Return JSON only, with this schema: \
         {{\"summary\":\"...\",\"translation\":\"...\",\"category\":\"...\"}}\n\n\
         [Post]\n{text}",
        lang = target_language,
        cats = categories.join(", "),
        text = text,
    )
}

/// Parse a completion into an [`AiSummary`]. Accepts a bare object, an
/// object wrapped in a ``` fence, or an object surrounded by chatter.
pub fn parse_response(raw: &str) -> Result<AiSummary, AiError> {
    let (Some(first), Some(last)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(AiError::Malformed(format!("no JSON object in: {}", preview(raw))));
    };
    if first >= last {
        return Err(AiError::Malformed(format!("no JSON object in: {}", preview(raw))));
    }

    let parsed: AiSummary = serde_json::from_str(&raw[first..=last])
        .map_err(|e| AiError::Malformed(e.to_string()))?;

    if parsed.summary.trim().is_empty() {
        return Err(AiError::Malformed("empty summary".to_string()));
    }
    Ok(AiSummary {
        summary: parsed.summary.trim().to_string(),
        translation: parsed.translation.trim().to_string(),
        category: parsed.category.trim().to_string(),
    })
}

fn preview(raw: &str) -> String {
    raw.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_language_and_categories() {
        let prompt = build_prompt("hello", "Korean");
        assert!(prompt.contains("in Korean"));
        assert!(prompt.contains("AI, Semiconductor, Mobile, Cloud, Network, Other"));
        assert!(prompt.ends_with("[Post]\nhello"));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"summary\": \" New chip \", \"translation\": \"t\", \"category\": \"Semiconductor\"}\n```";
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.summary, "New chip");
        assert_eq!(parsed.category, "Semiconductor");
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert!(matches!(parse_response("Sorry, I can't."), Err(AiError::Malformed(_))));
        assert!(matches!(parse_response("{\"category\":\"AI\"}"), Err(AiError::Malformed(_))));
        assert!(matches!(parse_response("{\"summary\":\"  \"}"), Err(AiError::Malformed(_))));
        assert!(matches!(parse_response("} {"), Err(AiError::Malformed(_))));
    }
}
