//! OpenAI chat-completions provider.

use super::{ChatRequest, ChatResponse, Message, Provider, ProviderError, TokenUsage};
use async_trait::async_trait;
use faq_common::api_call_span;
use faq_common::config::LlmConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::Instrument;

const PROVIDER: &str = "openai";

/// OpenAI API provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(Some(api_key.into()), "https://api.openai.com")
    }

    /// Create with custom base URL (for compatible APIs or tests).
    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self::build(api_key, base_url.into(), Duration::from_secs(300))
    }

    /// Create from the service configuration.
    ///
    /// A missing API key is accepted here and reported on the first call.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::build(
            config.api_key.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    fn build(api_key: Option<String>, base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::new(
                PROVIDER,
                &request.model,
                "OPENAI_API_KEY is not configured",
            ));
        };

        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        let openai_request = OpenAIRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&openai_request)
            .send()
            .instrument(api_call_span!(PROVIDER, model = %request.model))
            .await
            .map_err(|e| ProviderError::new(PROVIDER, &request.model, format!("Request failed: {e}")))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                ProviderError::new(PROVIDER, &request.model, format!("API error: {body}"))
                    .with_status(status.as_u16()),
            );
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER,
                &request.model,
                format!("Failed to parse response: {e}"),
            )
        })?;

        let choice = openai_response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::new(PROVIDER, &request.model, "Response contained no choices")
        })?;

        let usage = openai_response.usage.unwrap_or_default();

        Ok(ChatResponse {
            provider: PROVIDER.into(),
            model: openai_response.model.unwrap_or(request.model),
            content: choice.message.content.unwrap_or_default().trim().to_string(),
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            finish_reason: choice.finish_reason,
            latency_ms,
        })
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}
