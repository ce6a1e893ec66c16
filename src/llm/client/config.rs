//! LLM client configuration.
//!
//! Env vars: ANNOTATE_ENDPOINT, ANNOTATE_MODEL, ANNOTATE_API_KEY,
//! ANNOTATE_TIMEOUT_SECS, ANNOTATE_TOP_P, ANNOTATE_MAX_CONTENT_CHARS

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection and request settings for the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL; requests go to `{endpoint}/v1/chat/completions`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Static bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Hard per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Nucleus sampling parameter shared by all tasks
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Maximum characters of row text rendered into a prompt
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_endpoint() -> String {
    "https://api.siliconflow.cn".to_string()
}

fn default_model() -> String {
    "deepseek-ai/DeepSeek-V3".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_top_p() -> f32 {
    0.8
}

fn default_max_content_chars() -> usize {
    4000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            top_p: default_top_p(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl LlmConfig {
    /// Apply overrides from a variable lookup (normally `std::env::var`).
    ///
    /// Unparseable numeric values are ignored and the current value is kept.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("ANNOTATE_ENDPOINT") {
            self.endpoint = val;
        }
        if let Some(val) = lookup("ANNOTATE_MODEL") {
            self.model = val;
        }
        if let Some(val) = lookup("ANNOTATE_API_KEY") {
            if !val.trim().is_empty() {
                self.api_key = Some(val);
            }
        }
        if let Some(n) = lookup("ANNOTATE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = n;
        }
        if let Some(p) = lookup("ANNOTATE_TOP_P").and_then(|v| v.parse().ok()) {
            self.top_p = p;
        }
        if let Some(n) = lookup("ANNOTATE_MAX_CONTENT_CHARS").and_then(|v| v.parse().ok()) {
            self.max_content_chars = n;
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Hint shown when no API key is configured.
    pub fn availability_hint(&self) -> String {
        format!(
            "No API key configured for {}. Set ANNOTATE_API_KEY, pass --api-key, or add api_key under [llm] in the config file",
            self.endpoint
        )
    }
}
