use crate::types::{FetchConfig, FetchError};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// GET the feed document at `url` and return its body.
    pub async fn fetch_feed(&self, url: &str) -> Result<String, FetchError> {
        let start_time = Instant::now();
        let parsed_url = Url::parse(url)?;

        debug!("Fetching feed: {}", url);

        let mut response = self.client.get(parsed_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let limit_bytes = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit_bytes {
                return Err(FetchError::FeedTooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        // Content-Length is absent for chunked or compressed bodies
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit_bytes {
                return Err(FetchError::FeedTooLarge {
                    size_mb: (body.len() + chunk.len()) / (1024 * 1024),
                });
            }
            body.extend_from_slice(&chunk);
        }

        info!(
            "Fetched feed: {} ({} bytes in {}ms)",
            url,
            body.len(),
            start_time.elapsed().as_millis()
        );
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
