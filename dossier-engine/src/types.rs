use chrono::{DateTime, Utc};
pub use interfaces::defs::{
    Article, ArticleStore, Delivery, DigestMessage, DossierConfig, DossierConfigRow, DossierStore,
    FeedFetcher, Frequency, Mailer, NewDelivery, Summarizer, Summary, SummaryRequest, Tone,
    ToneStore, DEFAULT_TONE,
};
pub use interfaces::{DossierError, Result};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Dossier-Digest/1.0".to_string(),
            timeout_seconds: 30,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

/// Feed item as the parsing library hands it over, before normalization.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub link: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },
}

impl FetchError {
    pub fn for_source(self, url: &str) -> DossierError {
        DossierError::Fetch {
            url: url.to_string(),
            message: self.to_string(),
        }
    }
}
