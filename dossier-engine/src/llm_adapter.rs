use crate::traits::{InferenceClient, InferenceRequest};
use crate::types::{DossierError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama-compatible `/api/generate` client.
///
/// Every call carries its own timeout; there is no retry.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| DossierError::Inference(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn client_name(&self) -> String {
        format!("ollama ({})", self.base_url)
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let start_time = Instant::now();
        let body = GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| DossierError::Inference(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DossierError::Inference(format!("HTTP {}: {}", status.as_u16(), detail.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DossierError::Inference(format!("malformed response: {}", e)))?;

        debug!(
            model = %request.model,
            "Inference completed in {}ms ({} chars)",
            start_time.elapsed().as_millis(),
            parsed.response.len()
        );
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_generate_request_and_reads_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "stream": false,
                "system": "be brief",
                "options": { "num_predict": 2000 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3",
                "response": "Hello there",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let request = InferenceRequest::new("llama3", "Say hello")
            .with_system("be brief")
            .with_max_tokens(2000);
        let text = client.complete(&request).await.unwrap();
        assert_eq!(text, "Hello there");
    }

    #[tokio::test]
    async fn non_success_status_is_an_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let client = OllamaClient::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        let err = client
            .complete(&InferenceRequest::new("llama3", "hi"))
            .await
            .unwrap_err();
        match err {
            DossierError::Inference(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn times_out_per_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri(), Duration::from_millis(50)).unwrap();
        let result = client.complete(&InferenceRequest::new("llama3", "hi")).await;
        assert!(matches!(result, Err(DossierError::Inference(_))));
    }
}
