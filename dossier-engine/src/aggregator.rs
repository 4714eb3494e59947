use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::types::{Article, ArticleStore, FeedFetcher, FetchConfig, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Multi-source feed aggregation.
///
/// Sources are fetched one after another. A source that fails is logged and
/// skipped; an empty result is only returned when every source failed or all
/// of them were empty, and it is up to the caller to treat that as fatal.
pub struct FeedAggregator {
    fetcher: Fetcher,
    parser: FeedParser,
    store: Option<Arc<dyn ArticleStore>>,
}

impl FeedAggregator {
    pub fn new(fetch_config: FetchConfig) -> Result<Self> {
        let fetcher = Fetcher::new(fetch_config).map_err(|e| e.for_source("<client>"))?;
        Ok(Self {
            fetcher,
            parser: FeedParser::new(),
            store: None,
        })
    }

    /// Persist every aggregated batch through `store` (unique by link).
    pub fn with_store(mut self, store: Arc<dyn ArticleStore>) -> Self {
        self.store = Some(store);
        self
    }

    async fn fetch_source(&self, url: &str) -> Result<Vec<Article>> {
        let content = self
            .fetcher
            .fetch_feed(url)
            .await
            .map_err(|e| e.for_source(url))?;

        let parsed = self.parser.parse_feed(&content).map_err(|e| e.for_source(url))?;
        let mut articles = self.parser.to_articles(parsed, url, Utc::now());
        sort_by_recency(&mut articles);
        Ok(articles)
    }
}

#[async_trait]
impl FeedFetcher for FeedAggregator {
    async fn aggregate(&self, sources: &[String], target: usize) -> Result<Vec<Article>> {
        if sources.is_empty() || target == 0 {
            return Ok(Vec::new());
        }

        let mut batches = Vec::with_capacity(sources.len());
        let mut failed = 0;

        for url in sources {
            match self.fetch_source(url).await {
                Ok(articles) => {
                    debug!(feed = %url, items = articles.len(), "Fetched feed source");
                    batches.push(articles);
                }
                Err(e) => {
                    failed += 1;
                    warn!(feed = %url, error = %e, "Skipping feed source");
                }
            }
        }

        let merged = merge_sources(batches, target);
        info!(
            "Aggregated {} articles from {}/{} sources (target {})",
            merged.len(),
            sources.len() - failed,
            sources.len(),
            target
        );

        if let Some(store) = &self.store {
            match store.save_articles(&merged).await {
                Ok(stored) => debug!("Stored {} new articles out of {}", stored, merged.len()),
                Err(e) => warn!(error = %e, "Failed to persist aggregated articles"),
            }
        }

        Ok(merged)
    }
}

/// Even share of `target` per source, never below one.
pub fn per_source_quota(target: usize, sources: usize) -> usize {
    if sources == 0 {
        return 0;
    }
    (target / sources).max(1)
}

/// Merge per-source batches (each already newest-first) into one list.
///
/// Every source contributes up to its quota. Slots left open by short or
/// failed sources are back-filled from the other sources' surplus, newest
/// first. Links are unique across the result; the first occurrence wins.
pub fn merge_sources(batches: Vec<Vec<Article>>, target: usize) -> Vec<Article> {
    let quota = per_source_quota(target, batches.len());
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut surplus = Vec::new();

    for batch in batches {
        let mut taken = 0;
        for article in batch {
            if !seen.insert(article.link.clone()) {
                continue;
            }
            if taken < quota {
                selected.push(article);
                taken += 1;
            } else {
                surplus.push(article);
            }
        }
    }

    if selected.len() < target {
        sort_by_recency(&mut surplus);
        let missing = target - selected.len();
        selected.extend(surplus.into_iter().take(missing));
    }

    sort_by_recency(&mut selected);
    selected.truncate(target);
    selected
}

/// Newest first. Stable, so equal timestamps keep source order.
pub fn sort_by_recency(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
