use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Platform, SourceDescriptor};

pub const DEFAULT_SOURCES_FILE: &str = "sources.toml";

const EXAMPLE_SOURCES: &str = r#"# One [[source]] table per account or feed.
# platform is optional and detected from the URL (x, instagram, facebook, feed).

[[source]]
category = "Big Tech"
group = "AI"
name = "OpenAI"
url = "https://x.com/OpenAI"

[[source]]
category = "Big Tech"
group = "AI"
name = "Google AI"
url = "https://x.com/GoogleAI"

[[source]]
category = "Big Tech"
group = "AI"
name = "Google DeepMind"
url = "https://x.com/GoogleDeepMind"
"#;

#[derive(Debug, Deserialize)]
struct SourceFile {
    #[serde(default, rename = "source")]
    sources: Vec<SourceRow>,
}

#[derive(Debug, Deserialize)]
struct SourceRow {
    #[serde(default)]
    category: String,
    #[serde(default)]
    group: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    platform: Option<Platform>,
}

/// Read the source list. A missing file, a file without rows, or a file
/// whose rows all lack a URL is an error.
pub fn load_sources(path: &Path) -> Result<Vec<SourceDescriptor>> {
    if !path.exists() {
        return Err(AppError::Sources(format!(
            "{} not found (run with --create-sources to write an example)",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let file: SourceFile = toml::from_str(&content)?;

    let sources: Vec<SourceDescriptor> = file
        .sources
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            if row.url.trim().is_empty() {
                tracing::warn!(row = index + 1, name = %row.name, "source without url skipped");
                return None;
            }
            let source = SourceDescriptor::new(row.category, row.group, row.name, &row.url);
            Some(match row.platform {
                Some(platform) => source.with_platform(platform),
                None => source,
            })
        })
        .collect();

    if sources.is_empty() {
        return Err(AppError::Sources(format!("{} lists no usable sources", path.display())));
    }

    tracing::info!(path = %path.display(), sources = sources.len(), "loaded sources");
    Ok(sources)
}

/// Write the example source list unless the file already exists. Returns
/// whether a file was created.
pub fn ensure_sources_file(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, EXAMPLE_SOURCES)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SOURCES_FILE);

        assert!(ensure_sources_file(&path).unwrap());
        assert!(!ensure_sources_file(&path).unwrap());

        let sources = tokio_test::assert_ok!(load_sources(&path));
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|s| s.platform == Platform::X));
        assert_eq!(sources[0].handle().as_deref(), Some("OpenAI"));
    }

    #[test]
    fn explicit_platform_and_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.toml");
        std::fs::write(
            &path,
            r#"
[[source]]
name = "No url"

[[source]]
name = "Blog"
url = "blog.example.com/rss.xml"

[[source]]
name = "Mirror"
url = "https://mirror.example.com/acme"
platform = "x"
"#,
        )
        .unwrap();

        let sources = load_sources(&path).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].url, "https://blog.example.com/rss.xml");
        assert_eq!(sources[0].platform, Platform::Feed);
        assert_eq!(sources[1].platform, Platform::X);
    }

    #[test]
    fn missing_or_empty_lists_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.toml");
        assert!(matches!(load_sources(&path), Err(AppError::Sources(_))));

        std::fs::write(&path, "# nothing yet\n").unwrap();
        assert!(matches!(load_sources(&path), Err(AppError::Sources(_))));
    }
}
