use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DossierError {
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("No articles aggregated from {sources} source(s)")]
    AggregationEmpty { sources: usize },

    #[error("Selection failed: {0}")]
    Selection(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Tone not found: {name}")]
    ToneResolution { name: String },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Inference request failed: {0}")]
    Inference(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dossier not found: {id}")]
    NotFound { id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DossierError {
    /// Pipeline stage the error belongs to, used as a log field.
    pub fn stage(&self) -> &'static str {
        match self {
            DossierError::Fetch { .. } | DossierError::AggregationEmpty { .. } => "aggregation",
            DossierError::Selection(_) => "selection",
            DossierError::Extraction(_) => "extraction",
            DossierError::Generation(_)
            | DossierError::Inference(_)
            | DossierError::ToneResolution { .. } => "generation",
            DossierError::Template(_) => "composition",
            DossierError::Transport(_) => "transport",
            DossierError::InvalidConfig(_) | DossierError::NotFound { .. } => "configuration",
            DossierError::Database(_) => "persistence",
        }
    }
}

pub type Result<T> = std::result::Result<T, DossierError>;
