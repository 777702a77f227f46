//! Generation provider client.
//!
//! The engine depends only on the [`ChatProvider`] trait; production wires
//! in [`OpenAiProvider`], tests inject deterministic stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{PromptabError, Result};

/// One chat message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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
}

/// Request sent to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    pub message: ChatMessage,
}

/// Response returned by the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Text of the first choice, or empty when the provider returned none.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("")
    }
}

/// Black-box completion service consumed by the execution engine.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Connection settings for the OpenAI-compatible HTTP provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Per-call timeout; bounds a provider that never answers.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Build from environment variables. `OPENAI_API_KEY` is required;
    /// its absence is an auth failure raised before any execution.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PromptabError::Auth("OPENAI_API_KEY is not set".to_string()))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Ok(Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(120),
        })
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("promptab/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| PromptabError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::from_env()?)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(model = %request.model, "sending completion request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PromptabError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = body.chars().take(200).collect::<String>();
            return Err(PromptabError::Provider(format!(
                "provider returned {status}: {detail}"
            )));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| PromptabError::Provider(format!("malformed provider response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_first_choice() {
        let resp = ChatResponse {
            choices: vec![Choice {
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: "hello".to_string(),
                },
            }],
            usage: Usage {
                prompt_tokens: 3,
                completion_tokens: 1,
            },
        };
        assert_eq!(resp.text(), "hello");
    }

    #[test]
    fn response_text_empty_when_no_choices() {
        let resp = ChatResponse {
            choices: vec![],
            usage: Usage::default(),
        };
        assert_eq!(resp.text(), "");
    }

    #[test]
    fn response_deserializes_provider_wire_shape() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "42"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text(), "42");
        assert_eq!(resp.usage.prompt_tokens, 10);
        assert_eq!(resp.usage.completion_tokens, 2);
    }

    #[test]
    fn usage_defaults_when_absent() {
        let json = r#"{"choices": []}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.usage.prompt_tokens, 0);
    }

    #[test]
    fn config_from_env_requires_key() {
        // Runs with the variable scrubbed in a scoped way: only assert the
        // error kind when the key is genuinely absent.
        if std::env::var("OPENAI_API_KEY").is_err() {
            let err = ProviderConfig::from_env().unwrap_err();
            assert!(matches!(err, PromptabError::Auth(_)));
        }
    }
}
