//! LLM integration for row annotation.
//!
//! Talks to an OpenAI-compatible chat-completions API with a static bearer token.

mod client;

pub use client::{
    truncate_content, CompletionBackend, GenerationParams, LlmClient, LlmConfig, LlmError,
    DEFAULT_SENTIMENT_PROMPT, DEFAULT_TOPIC_PROMPT,
};
