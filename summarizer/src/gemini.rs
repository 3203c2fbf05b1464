//! Client for the Google Generative Language REST API
//!
//! Non-streaming `generateContent` only: prompts here are small and the
//! output is a short digest, so there is nothing to stream.

use crate::Summarizer;
use crate::errors::{Result, SummarizerError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Generative Language API host.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Model to use (e.g., "gemini-1.5-flash").
    pub model: String,
    /// Maximum tokens to generate.
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_output_tokens: 1024,
        }
    }
}

/// Google error response format.
#[derive(Debug, Deserialize)]
struct GoogleError {
    code: Option<u16>,
    message: String,
    status: Option<String>,
}

/// Google error wrapper.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GoogleError,
}

/// Non-streaming generateContent response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

/// Candidate response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

/// Candidate content.
#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Content part.
#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Prompt feedback (for blocked prompts).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Gemini-backed summarizer.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: GeminiConfig) -> Self {
        Self::with_base_url(api_key, config, GEMINI_API_BASE)
    }

    /// Point the client at a different host (for testing).
    pub fn with_base_url(
        api_key: impl Into<String>,
        config: GeminiConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            config,
        }
    }

    /// Run one prompt through generateContent and return the trimmed text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.config.model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.config.max_output_tokens }
        });

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            // Prefer the structured error body when the API sends one
            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(SummarizerError::ApiResponse {
                    status: error_response.error.code.unwrap_or(status.as_u16()),
                    message: error_response.error.message,
                    error_type: error_response.error.status,
                });
            }

            return Err(SummarizerError::ApiResponse {
                status: status.as_u16(),
                message: error_text,
                error_type: None,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::Parse(e.to_string()))?;

        if let Some(feedback) = &parsed.prompt_feedback
            && let Some(reason) = &feedback.block_reason
        {
            return Err(SummarizerError::Empty(format!("prompt blocked: {reason}")));
        }

        let text: String = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(SummarizerError::Empty("model returned no text".to_string()));
        }

        tracing::debug!(
            model = %self.config.model,
            chars = text.len(),
            "Generated summary"
        );
        Ok(text.to_string())
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}
