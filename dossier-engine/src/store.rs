use crate::types::{
    Article, ArticleStore, Delivery, DossierConfig, DossierConfigRow, DossierError, DossierStore,
    NewDelivery, Result, Tone, ToneStore,
};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CONFIG_COLUMNS: &str = "id, title, recipient_email, feed_urls, target_count, frequency, \
delivery_time, timezone, tone, language, special_instructions, is_active, created_at, updated_at";

/// Postgres-backed storage for configurations, articles, tones and deliveries.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    /// Apply the schema in `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| DossierError::Database(e.into()))?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl DossierStore for PgStore {
    async fn active_configs(&self) -> Result<Vec<DossierConfig>> {
        let rows = sqlx::query_as::<_, DossierConfigRow>(&format!(
            "SELECT {} FROM dossier_configs WHERE is_active = TRUE ORDER BY created_at",
            CONFIG_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        let total = rows.len();
        let mut configs = Vec::with_capacity(total);
        for row in rows {
            let id = row.id;
            match DossierConfig::try_from(row) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(config = %id, error = %e, "Skipping invalid dossier configuration"),
            }
        }

        debug!("Loaded {}/{} active configurations", configs.len(), total);
        Ok(configs)
    }

    async fn config(&self, id: Uuid) -> Result<Option<DossierConfig>> {
        let row = sqlx::query_as::<_, DossierConfigRow>(&format!(
            "SELECT {} FROM dossier_configs WHERE id = $1",
            CONFIG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(DossierConfig::try_from).transpose()
    }

    async fn latest_delivery(&self, config_id: Uuid) -> Result<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT id, config_id, delivered_at, summary, article_count, success, error_message
            FROM deliveries
            WHERE config_id = $1
            ORDER BY delivered_at DESC
            LIMIT 1
            "#,
        )
        .bind(config_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(delivery)
    }

    async fn record_delivery(&self, delivery: NewDelivery) -> Result<Delivery> {
        let record = sqlx::query_as::<_, Delivery>(
            r#"
            INSERT INTO deliveries (id, config_id, delivered_at, summary, article_count, success, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, config_id, delivered_at, summary, article_count, success, error_message
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(delivery.config_id)
        .bind(delivery.delivered_at)
        .bind(&delivery.summary)
        .bind(delivery.article_count)
        .bind(delivery.success)
        .bind(&delivery.error_message)
        .fetch_one(&self.db)
        .await?;

        debug!(config = %record.config_id, success = record.success, "Recorded delivery {}", record.id);
        Ok(record)
    }
}

#[async_trait]
impl ArticleStore for PgStore {
    async fn save_articles(&self, articles: &[Article]) -> Result<usize> {
        let mut tx = self.db.begin().await?;
        let mut inserted = 0;

        for article in articles {
            let result = sqlx::query(
                r#"
                INSERT INTO articles (id, source, title, link, description, content, author, published_at, fetched_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (link) DO NOTHING
                "#,
            )
            .bind(article.id)
            .bind(&article.source)
            .bind(&article.title)
            .bind(&article.link)
            .bind(&article.description)
            .bind(&article.content)
            .bind(&article.author)
            .bind(article.published_at)
            .bind(article.fetched_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl ToneStore for PgStore {
    async fn find_tone(&self, name: &str) -> Result<Option<Tone>> {
        let tone = sqlx::query_as::<_, Tone>(
            "SELECT id, name, style_prompt, is_system_default, requires_unrestricted FROM tones WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        Ok(tone)
    }

    async fn list_tones(&self) -> Result<Vec<Tone>> {
        let tones = sqlx::query_as::<_, Tone>(
            r#"
            SELECT id, name, style_prompt, is_system_default, requires_unrestricted
            FROM tones
            ORDER BY is_system_default DESC, name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(tones)
    }
}
