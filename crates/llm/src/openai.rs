//! OpenAI-Compatible Provider
//!
//! Implementation of the `LlmProvider` trait for any endpoint that speaks the
//! OpenAI chat-completions protocol (OpenAI, DeepSeek, Qwen compatible mode,
//! Ollama's `/v1` API).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::http_client::build_http_client;
use crate::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use crate::types::{
    LlmError, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig, UsageStats,
};

/// Chat-completions provider
pub struct OpenAICompatibleProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAICompatibleProvider {
    /// Create a provider with the given configuration.
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(config.proxy.as_deref())?;
        Ok(Self { config, client })
    }

    /// Get the API endpoint
    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.config.provider.default_endpoint())
    }

    /// Build the request body for the API
    fn build_request_body(&self, messages: &[Message], system: Option<&str>) -> serde_json::Value {
        let mut wire_messages: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(sys) = system {
            wire_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        for msg in messages {
            wire_messages.push(Self::message_to_wire(msg));
        }

        serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
            "messages": wire_messages,
        })
    }

    fn message_to_wire(message: &Message) -> serde_json::Value {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        };
        serde_json::json!({
            "role": role,
            "content": message.content
        })
    }

    fn parse_response(response: ChatResponse) -> LlmResponse {
        let (content, thinking, finish_reason) = match response.choices.into_iter().next() {
            Some(choice) => {
                let (content, thinking) = choice
                    .message
                    .map(|m| (m.content, m.reasoning_content))
                    .unwrap_or((None, None));
                (content, thinking, choice.finish_reason)
            }
            None => (None, None, None),
        };

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            thinking,
            finish_reason,
            usage,
            model: response.model,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAICompatibleProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
    ) -> LlmResult<LlmResponse> {
        let provider = self.config.provider.to_string();
        let api_key = match self.config.api_key.as_deref() {
            Some(key) => Some(key),
            None if self.config.provider.requires_api_key() => {
                return Err(missing_api_key_error(&provider));
            }
            None => None,
        };

        let body = self.build_request_body(&messages, system.as_deref());

        let mut request = self
            .client
            .post(self.base_url())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &body_text, &provider));
        }

        debug!(provider = %provider, len = body_text.len(), "chat completion received");

        let parsed: ChatResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(Self::parse_response(parsed))
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
