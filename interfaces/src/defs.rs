use crate::error::{DossierError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

pub const MIN_TARGET_COUNT: u32 = 1;
pub const MAX_TARGET_COUNT: u32 = 50;
pub const DEFAULT_TONE: &str = "professional";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = DossierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(DossierError::InvalidConfig(format!("unknown frequency '{}'", other))),
        }
    }
}

/// A saved recurring-digest configuration, validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DossierConfig {
    pub id: Uuid,
    pub title: String,
    pub recipient: String,
    pub feed_urls: Vec<String>,
    pub target_count: u32,
    pub frequency: Frequency,
    pub delivery_time: NaiveTime,
    pub timezone: Tz,
    pub tone: String,
    pub language: Option<String>,
    pub special_instructions: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `dossier_configs` row as written by the API layer.
///
/// Nothing in the engine reads this directly; it goes through
/// `DossierConfig::try_from` first.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DossierConfigRow {
    pub id: Uuid,
    pub title: String,
    pub recipient_email: String,
    pub feed_urls: Vec<String>,
    pub target_count: i32,
    pub frequency: String,
    pub delivery_time: NaiveTime,
    pub timezone: String,
    pub tone: String,
    pub language: Option<String>,
    pub special_instructions: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DossierConfigRow> for DossierConfig {
    type Error = DossierError;

    fn try_from(row: DossierConfigRow) -> Result<Self> {
        let id = row.id;
        let invalid = |msg: String| DossierError::InvalidConfig(format!("dossier {}: {}", id, msg));

        let title = row.title.trim().to_string();
        if title.is_empty() {
            return Err(invalid("title is empty".to_string()));
        }

        let recipient = row.recipient_email.trim().to_string();
        if !is_plausible_address(&recipient) {
            return Err(invalid(format!("recipient '{}' is not an email address", recipient)));
        }

        let mut seen = HashSet::new();
        let mut feed_urls = Vec::with_capacity(row.feed_urls.len());
        for raw in &row.feed_urls {
            let url = raw.trim();
            if url.is_empty() {
                continue;
            }
            let parsed = Url::parse(url).map_err(|e| invalid(format!("feed url '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(format!("feed url '{}' must be http or https", url)));
            }
            if seen.insert(url.to_string()) {
                feed_urls.push(url.to_string());
            }
        }
        if feed_urls.is_empty() {
            return Err(invalid("no feed sources configured".to_string()));
        }

        let target_count = u32::try_from(row.target_count)
            .ok()
            .filter(|n| (MIN_TARGET_COUNT..=MAX_TARGET_COUNT).contains(n))
            .ok_or_else(|| {
                invalid(format!(
                    "target count {} outside {}..={}",
                    row.target_count, MIN_TARGET_COUNT, MAX_TARGET_COUNT
                ))
            })?;

        let frequency = row.frequency.parse::<Frequency>().map_err(|e| invalid(e.to_string()))?;

        let timezone = row
            .timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| invalid(format!("timezone '{}': {}", row.timezone, e)))?;

        let tone = match row.tone.trim() {
            "" => DEFAULT_TONE.to_string(),
            name => name.to_string(),
        };

        Ok(DossierConfig {
            id,
            title,
            recipient,
            feed_urls,
            target_count,
            frequency,
            delivery_time: row.delivery_time,
            timezone,
            tone,
            language: non_blank(row.language),
            special_instructions: non_blank(row.special_instructions),
            active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn is_plausible_address(address: &str) -> bool {
    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !address.contains(char::is_whitespace)
        }
        _ => false,
    }
}

/// A normalized feed item. `link` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: Uuid,
    pub source: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    /// Description when present, full content otherwise.
    pub fn best_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.content
        } else {
            &self.description
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tone {
    pub id: Uuid,
    pub name: String,
    pub style_prompt: String,
    pub is_system_default: bool,
    pub requires_unrestricted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    pub id: Uuid,
    pub config_id: Uuid,
    pub delivered_at: DateTime<Utc>,
    pub summary: String,
    pub article_count: i32,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub config_id: Uuid,
    pub delivered_at: DateTime<Utc>,
    pub summary: String,
    pub article_count: i32,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewDelivery {
    pub fn succeeded(config_id: Uuid, at: DateTime<Utc>, summary: String, article_count: usize) -> Self {
        Self {
            config_id,
            delivered_at: at,
            summary,
            article_count: i32::try_from(article_count).unwrap_or(i32::MAX),
            success: true,
            error_message: None,
        }
    }

    pub fn failed(config_id: Uuid, at: DateTime<Utc>, error: &DossierError) -> Self {
        Self {
            config_id,
            delivered_at: at,
            summary: String::new(),
            article_count: 0,
            success: false,
            error_message: Some(format!("[{}] {}", error.stage(), error)),
        }
    }

    pub fn into_delivery(self, id: Uuid) -> Delivery {
        Delivery {
            id,
            config_id: self.config_id,
            delivered_at: self.delivered_at,
            summary: self.summary,
            article_count: self.article_count,
            success: self.success,
            error_message: self.error_message,
        }
    }
}

/// Voice parameters handed to the summarizer.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub tone: String,
    pub language: Option<String>,
    pub special_instructions: Option<String>,
}

impl From<&DossierConfig> for SummaryRequest {
    fn from(config: &DossierConfig) -> Self {
        Self {
            tone: config.tone.clone(),
            language: config.language.clone(),
            special_instructions: config.special_instructions.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub text: String,
    /// Articles the summary was written from, after selection.
    pub articles: Vec<Article>,
    pub model: String,
    pub tone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigestMessage {
    pub recipient: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

// Capability seams. The scheduler holds one of each behind an `Arc<dyn _>`
// so every collaborator can be swapped for an in-memory double in tests.

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch, normalize and merge the given sources into at most `target` articles.
    async fn aggregate(&self, sources: &[String], target: usize) -> Result<Vec<Article>>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, articles: Vec<Article>, request: &SummaryRequest) -> Result<Summary>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &DigestMessage) -> Result<()>;
}

#[async_trait]
pub trait DossierStore: Send + Sync {
    /// Active configurations that pass validation. Invalid rows are skipped.
    async fn active_configs(&self) -> Result<Vec<DossierConfig>>;

    async fn config(&self, id: Uuid) -> Result<Option<DossierConfig>>;

    async fn latest_delivery(&self, config_id: Uuid) -> Result<Option<Delivery>>;

    async fn record_delivery(&self, delivery: NewDelivery) -> Result<Delivery>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert articles unique by link. Returns how many were new.
    async fn save_articles(&self, articles: &[Article]) -> Result<usize>;
}

#[async_trait]
pub trait ToneStore: Send + Sync {
    async fn find_tone(&self, name: &str) -> Result<Option<Tone>>;

    async fn list_tones(&self) -> Result<Vec<Tone>>;
}
