//! LLM client for row annotation.
//!
//! Sends a single user message to an OpenAI-compatible chat-completions API
//! and returns the raw completion text.

mod config;
mod prompts;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use config::LlmConfig;
pub use prompts::{DEFAULT_SENTIMENT_PROMPT, DEFAULT_TOPIC_PROMPT};

/// Per-task generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Anything that can turn a prompt into a completion.
///
/// The pipeline only depends on this trait, so tests can drive it with a
/// scripted backend instead of a live endpoint.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run a single completion request. One call is one outbound request.
    async fn complete(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, LlmError>;
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No API key configured")]
    MissingApiKey,
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout(_))
    }
}

/// Chat-completions client.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl LlmClient {
    /// Create a new client. The configured timeout applies to every request.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn call_chat(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        let url = self.config.completions_url();
        debug!("POST {} (model: {})", url, self.config.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let chat: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout_secs)
            } else {
                LlmError::Parse(e.to_string())
            }
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response contained no completion".to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        self.call_chat(prompt, params).await
    }
}

/// Truncate text to at most `max_chars` bytes (UTF-8 safe).
pub fn truncate_content(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("hello", 10), "hello");
        assert_eq!(truncate_content("hello", 3), "hel");
        // "不相关" is 9 bytes; cutting at 4 must back off to a char boundary
        assert_eq!(truncate_content("不相关", 4), "不");
        assert_eq!(truncate_content("不相关", 2), "");
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "deepseek-ai/DeepSeek-V3",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 50,
            temperature: 0.1,
            top_p: 0.8,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "deepseek-ai/DeepSeek-V3");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["max_tokens"], 50);
    }

    #[test]
    fn test_completions_url() {
        let config = LlmConfig::default().with_endpoint("https://api.example.com/");
        assert_eq!(
            config.completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
        let config = LlmConfig::default().with_endpoint("http://localhost:8080/v1");
        assert_eq!(
            config.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = LlmConfig::default().with_overrides_from(|key| match key {
            "ANNOTATE_MODEL" => Some("qwen".to_string()),
            "ANNOTATE_API_KEY" => Some("sk-test".to_string()),
            "ANNOTATE_TIMEOUT_SECS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(config.model, "qwen");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = LlmClient::new(LlmConfig::default()).unwrap();
        let params = GenerationParams {
            max_tokens: 10,
            temperature: 0.1,
            top_p: 0.8,
        };
        let err = client.complete("hi", &params).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }
}
