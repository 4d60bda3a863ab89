//! Vertex AI text-generation client shared by the translator and the
//! transcript post-processor.

pub mod models;

pub use models::{auto_detect_order, VertexModel};

use crate::auth::AccessTokenCache;
use crate::error::{DubberError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum retries for a single (region, model) call.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// Generation parameters derived from the caller's quality setting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "topP")]
    pub top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

/// Client for the region-scoped `generateContent` endpoint.
pub struct VertexClient {
    client: reqwest::Client,
    project_id: String,
    tokens: Arc<AccessTokenCache>,
    base_url: Option<String>,
}

impl VertexClient {
    pub fn new(project_id: String, tokens: Arc<AccessTokenCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            project_id,
            tokens,
            base_url: None,
        }
    }

    /// Override the endpoint base URL (tests point this at a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn endpoint(&self, region: &str, model: &str) -> String {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{region}-aiplatform.googleapis.com"),
        };
        format!(
            "{base}/v1/projects/{}/locations/{region}/publishers/google/models/{model}:generateContent",
            self.project_id
        )
    }

    /// Send one prompt to one (region, model) pair, retrying transient
    /// failures with exponential backoff. Client errors fail fast; a 401
    /// additionally invalidates the cached token so the next call
    /// re-authenticates.
    pub async fn generate(
        &self,
        region: &str,
        model: &str,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String> {
        let url = self.endpoint(region, model);

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(config),
        };

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let token = self.tokens.token().await?;

            let response = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    debug!("Vertex AI response status for {model}@{region}: {status}");

                    if status.is_success() {
                        let parsed: GenerateContentResponse = resp.json().await?;
                        return extract_text(parsed);
                    }

                    let error_body = resp.text().await.unwrap_or_default();

                    if status.as_u16() == 401 {
                        self.tokens.invalidate().await;
                        return Err(DubberError::ProviderNotAvailable(format!(
                            "Vertex AI authentication failed: {error_body}"
                        )));
                    }

                    // Retry server errors and rate limits, fail fast otherwise.
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!("Vertex AI transient error ({status}): {error_body}");
                        last_error = Some(DubberError::TranslationFailed(format!(
                            "Vertex AI error {status}: {error_body}"
                        )));
                        continue;
                    }

                    return Err(DubberError::TranslationFailed(format!(
                        "Vertex AI error ({status}): {error_body}"
                    )));
                }
                Err(e) => {
                    warn!("Vertex AI request failed: {e}");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DubberError::TranslationFailed("Unknown Vertex AI error".into())))
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|p| p.into_iter().next())
        .and_then(|p| p.text)
        .map(|t| t.trim().to_string())
        .ok_or_else(|| DubberError::TranslationFailed("Vertex AI returned no text".to_string()))
}

// Request/Response types

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}
