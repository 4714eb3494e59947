use crate::processing::{
    extraction_prompt, generation_prompt, parse_selection_indices, selection_prompt,
    strip_code_fences, strip_html, ArticleFacts, EXTRACTION_SYSTEM, GENERATION_SYSTEM,
    SELECTION_SYSTEM,
};
use crate::tones::{resolve_tone, ModelRoute, ModelSelection};
use crate::traits::{InferenceClient, InferenceRequest};
use crate::types::{Article, DossierError, Result, Summarizer, Summary, SummaryRequest, Tone, ToneStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Article sets larger than this go through the selection stage.
    pub selection_size: usize,
    pub selection_temperature: f32,
    pub extraction_temperature: f32,
    pub generation_temperature: f32,
    pub generation_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selection_size: 10,
            selection_temperature: 0.2,
            extraction_temperature: 0.2,
            generation_temperature: 0.7,
            generation_max_tokens: 2000,
        }
    }
}

/// Selection, factual extraction, then tone-conditioned generation.
///
/// The first two stages degrade to the unfiltered input; only generation
/// can fail the run.
pub struct SummarizationPipeline {
    inference: Arc<dyn InferenceClient>,
    tones: Arc<dyn ToneStore>,
    models: ModelSelection,
    config: PipelineConfig,
}

impl SummarizationPipeline {
    pub fn new(inference: Arc<dyn InferenceClient>, tones: Arc<dyn ToneStore>, models: ModelSelection) -> Self {
        info!(
            "Summarization via {} (standard: {}, unrestricted: {})",
            inference.client_name(),
            models.standard,
            models.unrestricted
        );
        Self {
            inference,
            tones,
            models,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Stage A. Sets at or under the selection size pass through untouched.
    pub async fn select(&self, articles: Vec<Article>) -> Vec<Article> {
        let pick = self.config.selection_size;
        if articles.len() <= pick {
            return articles;
        }

        let request = InferenceRequest::new(&self.models.standard, selection_prompt(&articles, pick))
            .with_system(SELECTION_SYSTEM)
            .with_temperature(self.config.selection_temperature);

        let response = match self.inference.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                let err = DossierError::Selection(e.to_string());
                warn!(error = %err, "Selection unavailable, keeping all {} articles", articles.len());
                return articles;
            }
        };

        let mut indices = parse_selection_indices(&response, articles.len());
        if indices.is_empty() {
            let err = DossierError::Selection(format!(
                "no usable indices in reply: {}",
                response.trim()
            ));
            warn!(error = %err, "Keeping all {} articles", articles.len());
            return articles;
        }

        indices.truncate(pick);
        indices.sort_unstable();
        info!(indices = ?indices, "Selected {} of {} articles", indices.len(), articles.len());

        let mut slots: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
        indices.into_iter().filter_map(|i| slots[i].take()).collect()
    }

    /// Stage B. One call per article; any failure keeps the raw text.
    pub async fn extract(&self, articles: &[Article]) -> Vec<ArticleFacts> {
        let mut facts = Vec::with_capacity(articles.len());
        let mut fallbacks = 0;

        for article in articles {
            let request = InferenceRequest::new(&self.models.standard, extraction_prompt(article))
                .with_system(EXTRACTION_SYSTEM)
                .with_temperature(self.config.extraction_temperature);

            let outcome = match self.inference.complete(&request).await {
                Ok(text) => {
                    let cleaned = strip_html(&strip_code_fences(&text));
                    if cleaned.is_empty() {
                        Err(DossierError::Extraction("empty response".to_string()))
                    } else {
                        Ok(cleaned)
                    }
                }
                Err(e) => Err(DossierError::Extraction(e.to_string())),
            };

            match outcome {
                Ok(text) => facts.push(ArticleFacts::new(article, text)),
                Err(e) => {
                    fallbacks += 1;
                    debug!(link = %article.link, error = %e, "Extraction fell back to article text");
                    facts.push(ArticleFacts::from_raw(article));
                }
            }
        }

        if fallbacks > 0 {
            warn!("Extraction fell back to raw text for {}/{} articles", fallbacks, articles.len());
        }
        facts
    }

    /// Stage C. Errors and empty output are fatal.
    pub async fn generate(&self, tone: &Tone, request: &SummaryRequest, facts: &[ArticleFacts]) -> Result<(String, String)> {
        let model = self.models.model_for(ModelRoute::for_tone(tone)).to_string();
        let inference = InferenceRequest::new(&model, generation_prompt(tone, request, facts))
            .with_system(GENERATION_SYSTEM)
            .with_temperature(self.config.generation_temperature)
            .with_max_tokens(self.config.generation_max_tokens);

        info!(model = %model, tone = %tone.name, "Generating summary from {} articles", facts.len());

        let text = self
            .inference
            .complete(&inference)
            .await
            .map_err(|e| DossierError::Generation(e.to_string()))?;

        let text = strip_code_fences(&text);
        if text.is_empty() {
            return Err(DossierError::Generation(format!("model {} returned an empty summary", model)));
        }
        Ok((text, model))
    }
}

#[async_trait]
impl Summarizer for SummarizationPipeline {
    async fn summarize(&self, articles: Vec<Article>, request: &SummaryRequest) -> Result<Summary> {
        if articles.is_empty() {
            return Err(DossierError::Generation("no articles to summarize".to_string()));
        }

        let selected = self.select(articles).await;
        let facts = self.extract(&selected).await;
        let tone = resolve_tone(self.tones.as_ref(), &request.tone).await;
        let (text, model) = self.generate(&tone, request, &facts).await?;

        Ok(Summary {
            text,
            articles: selected,
            model,
            tone: tone.name,
        })
    }
}
