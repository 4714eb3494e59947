use chrono::{NaiveTime, TimeZone, Utc};
use interfaces::defs::{Article, DossierConfig, Frequency, Summary};
use std::time::Duration;
use uuid::Uuid;

/// GreenMail's plain SMTP port, as started by `docker run greenmail/standalone`.
pub const GREENMAIL_SMTP_URI: &str = "smtp://localhost:3025?tls=none";
pub const GREENMAIL_ADDRESS: &str = "test@localhost";

/// Whether something is listening on the GreenMail SMTP port.
pub async fn is_greenmail_running() -> bool {
    let connect = tokio::net::TcpStream::connect(("127.0.0.1", 3025));
    matches!(tokio::time::timeout(Duration::from_secs(1), connect).await, Ok(Ok(_)))
}

pub fn sample_config(recipient: &str) -> DossierConfig {
    DossierConfig {
        id: Uuid::new_v4(),
        title: "Integration Brief".to_string(),
        recipient: recipient.to_string(),
        feed_urls: vec!["https://feeds.example.com/rss".to_string()],
        target_count: 5,
        frequency: Frequency::Daily,
        delivery_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        timezone: chrono_tz::Europe::Berlin,
        tone: "professional".to_string(),
        language: Some("English".to_string()),
        special_instructions: None,
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn sample_articles() -> Vec<Article> {
    let published = Utc.with_ymd_and_hms(2024, 6, 3, 9, 15, 0).unwrap();
    vec![
        Article {
            id: Uuid::new_v4(),
            source: "https://feeds.example.com/rss".to_string(),
            title: "Rates held steady".to_string(),
            link: "https://www.example.com/economy/rates".to_string(),
            description: "The central bank left rates unchanged for a third meeting.".to_string(),
            content: String::new(),
            author: "Desk".to_string(),
            published_at: published,
            fetched_at: published,
        },
        Article {
            id: Uuid::new_v4(),
            source: "https://feeds.example.com/rss".to_string(),
            title: "Unicode check: café ✅".to_string(),
            link: "https://example.com/culture/cafe".to_string(),
            description: "<p>Cafés reopen after renovation.</p>".to_string(),
            content: String::new(),
            author: String::new(),
            published_at: published,
            fetched_at: published,
        },
    ]
}

pub const SAMPLE_SUMMARY: &str = "<p>Rates <a href=\"https://www.example.com/economy/rates\">held steady</a> \
while cafés <a href=\"https://example.com/culture/cafe\">reopened</a>.</p>";

pub fn sample_summary() -> Summary {
    Summary {
        text: SAMPLE_SUMMARY.to_string(),
        articles: sample_articles(),
        model: "llama3.1:8b".to_string(),
        tone: "professional".to_string(),
    }
}
