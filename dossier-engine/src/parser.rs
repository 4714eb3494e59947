use crate::types::{Article, FetchError, ParsedEntry, ParsedFeed};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::debug;
use uuid::Uuid;

/// Thin wrapper over `feed-rs`: RSS/Atom/JSON Feed in, normalized `Article`s out.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed, FetchError> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| FetchError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let entries = feed.entries.into_iter().filter_map(Self::parse_entry).collect();

        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        // Entries without a link have no identity and are dropped.
        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty())
            .or_else(|| {
                let id = entry.id.trim();
                (id.starts_with("http://") || id.starts_with("https://")).then(|| id.to_string())
            })?;

        Some(ParsedEntry {
            link,
            title: entry.title.map(|t| t.content),
            description: entry.summary.map(|s| s.content),
            content: entry.content.and_then(|c| c.body),
            author: entry.authors.first().map(|a| a.name.clone()),
            published_at: entry.published.or(entry.updated),
        })
    }

    /// Apply the normalization policy: missing timestamp becomes `fetched_at`,
    /// missing content falls back to the description, missing author is empty.
    pub fn normalize(&self, entry: ParsedEntry, source: &str, fetched_at: DateTime<Utc>) -> Article {
        let description = non_empty(entry.description).unwrap_or_default();
        let content = non_empty(entry.content).unwrap_or_else(|| description.clone());

        Article {
            id: Uuid::new_v4(),
            source: source.to_string(),
            title: non_empty(entry.title).unwrap_or_else(|| "Untitled".to_string()),
            link: entry.link,
            description,
            content,
            author: non_empty(entry.author).unwrap_or_default(),
            published_at: entry.published_at.unwrap_or(fetched_at),
            fetched_at,
        }
    }

    pub fn to_articles(&self, parsed: ParsedFeed, source: &str, fetched_at: DateTime<Utc>) -> Vec<Article> {
        parsed
            .entries
            .into_iter()
            .map(|entry| self.normalize(entry, source, fetched_at))
            .collect()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Sample</title>
    <link>https://example.com/</link>
    <description>Sample feed</description>
    <item>
      <title>With date</title>
      <link>https://example.com/a</link>
      <description>First description</description>
      <author>jane@example.com (Jane)</author>
      <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
    </item>
    <item>
      <title>No date</title>
      <link>https://example.com/b</link>
      <description>Second description</description>
    </item>
    <item>
      <title>No link</title>
      <description>Dropped</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_entries_and_drops_linkless_ones() {
        let parsed = FeedParser::new().parse_feed(RSS).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Sample"));
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].link, "https://example.com/a");
    }

    #[test]
    fn normalization_fills_missing_fields() {
        let parser = FeedParser::new();
        let fetched_at = Utc.with_ymd_and_hms(2024, 10, 22, 9, 0, 0).unwrap();
        let parsed = parser.parse_feed(RSS).unwrap();
        let articles = parser.to_articles(parsed, "https://example.com/rss", fetched_at);

        let dated = &articles[0];
        assert_eq!(dated.published_at, Utc.with_ymd_and_hms(2024, 10, 21, 7, 28, 0).unwrap());
        assert_eq!(dated.content, "First description");

        let undated = &articles[1];
        assert_eq!(undated.published_at, fetched_at);
        assert_eq!(undated.author, "");
        assert_eq!(undated.content, undated.description);
        assert_eq!(undated.source, "https://example.com/rss");
    }

    #[test]
    fn rejects_garbage() {
        assert!(FeedParser::new().parse_feed("<html><body>nope</body></html>").is_err());
    }

    #[test]
    fn missing_title_becomes_untitled() {
        let entry = ParsedEntry {
            link: "https://example.com/x".to_string(),
            title: Some("   ".to_string()),
            description: None,
            content: Some("Body".to_string()),
            author: None,
            published_at: None,
        };
        let article = FeedParser::new().normalize(entry, "src", Utc::now());
        assert_eq!(article.title, "Untitled");
        assert_eq!(article.description, "");
        assert_eq!(article.content, "Body");
    }
}
