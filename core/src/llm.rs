use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::errors::{CoqlError, CoqlResult};

/// Common trait for chat-completion backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion and return the assistant text
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> CoqlResult<String>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &str;

    /// Get the model name being used
    fn model_name(&self) -> String;
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints (Groq by default)
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    provider: String,
    model_name: String,
    base_url: String,
    http_client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct ProviderErrorResponse {
    error: ProviderError,
}

#[derive(Deserialize, Debug)]
struct ProviderError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(config: &LlmConfig) -> CoqlResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CoqlError::ConfigError(format!(
                    "API key is required for the {} LLM client",
                    config.provider
                ))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| CoqlError::ConfigError("Invalid API key format".to_string()))?,
        );

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            provider: config.provider.clone(),
            model_name: config.model_name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn api_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for ChatCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> CoqlResult<String> {
        debug!(
            provider = %self.provider,
            model = %self.model_name,
            messages = messages.len(),
            "Requesting chat completion"
        );

        let request = ChatRequest {
            model: &self.model_name,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .http_client
            .post(self.api_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| CoqlError::RequestError(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CoqlError::ResponseError(format!("Failed to read LLM response: {}", e))
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ProviderErrorResponse>(&body) {
                Ok(parsed) => format!(
                    "{} ({})",
                    parsed.error.message,
                    parsed.error.error_type.unwrap_or_else(|| "unknown".to_string())
                ),
                Err(_) => body,
            };
            return Err(CoqlError::HttpError {
                status_code: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| CoqlError::ParsingError(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                total = usage.total_tokens,
                "LLM token usage"
            );
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CoqlError::ResponseError("No choices in LLM response".to_string()))?;

        if let Some(reason) = choice.finish_reason.as_deref() {
            if reason != "stop" {
                warn!(reason, "LLM generation did not finish cleanly");
            }
        }

        choice
            .message
            .content
            .map(|text| text.trim().to_string())
            .ok_or_else(|| CoqlError::ResponseError("No content in LLM response".to_string()))
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }
}
