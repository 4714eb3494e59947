use crate::types::Result;
use async_trait::async_trait;

/// One non-streaming completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub prompt: String,
    /// Optional system instruction sent alongside the prompt
    pub system: Option<String>,
    pub temperature: f32,
    /// Output cap in tokens
    pub max_tokens: Option<u32>,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Text-completion endpoint used by every pipeline stage.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Name used in logs.
    fn client_name(&self) -> String;

    /// Run the request and return the generated text.
    async fn complete(&self, request: &InferenceRequest) -> Result<String>;
}
