//! Anthropic Messages API engine

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{EngineError, GenerationRequest, GenerationResponse, ReasoningEngine};
use crate::config::EngineConfig;

/// Anthropic Messages API engine
///
/// Each call is a single request; retry policy lives with the caller
/// (`retry::with_retries`), which backs off on the errors this engine
/// classifies as retryable.
pub struct AnthropicEngine {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicEngine {
    /// Create a new engine from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::InvalidResponse(format!("API key not found in {}", config.api_key_env))
        })?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(EngineError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system,
            "messages": [{
                "role": "user",
                "content": request.prompt,
            }],
        })
    }

    fn parse_response(&self, api_response: AnthropicResponse) -> Result<GenerationResponse, EngineError> {
        let text = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
            })
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(EngineError::InvalidResponse("Response contained no text".to_string()));
        }

        Ok(GenerationResponse {
            text,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        })
    }
}

#[async_trait]
impl ReasoningEngine for AnthropicEngine {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, EngineError> {
        debug!(%self.model, request.max_tokens, "generate: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(EngineError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::ApiError { status, message: text });
        }

        let api_response: AnthropicResponse = response.json().await?;
        self.parse_response(api_response)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
