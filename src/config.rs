//! Pipeline configuration.
//!
//! Built once at startup from (in increasing priority) built-in defaults, a
//! TOML config file, `ANNOTATE_*` environment variables and CLI flags, then
//! passed by reference to every component.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::llm::LlmConfig;

/// Config file looked up in the working directory when `--config` is absent.
pub const LOCAL_CONFIG_FILENAME: &str = "annotate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Complete, immutable configuration for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub topics: TopicTaskConfig,
    #[serde(default)]
    pub sentiment: SentimentTaskConfig,
    /// Where this config was loaded from, if anywhere.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Retry, pacing and checkpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Flush the output every N processed rows
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per row before recording a failure sentinel
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    /// Base backoff between attempts; attempt n waits n times this
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Fixed pause after every row
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

fn default_batch_size() -> usize {
    80
}

fn default_retry_times() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_request_delay_ms() -> u64 {
    2000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry_times: default_retry_times(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl RunConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Topic-matching task settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTaskConfig {
    /// Input column holding the post text
    #[serde(default = "default_content_column")]
    pub column: String,
    /// Allowed topic vocabulary, in match priority order
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// Custom prompt (uses {topic_list} and {content} placeholders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_topic_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_topic_temperature")]
    pub temperature: f32,
}

fn default_content_column() -> String {
    "combine_notes".to_string()
}

pub fn default_topics() -> Vec<String> {
    ["cattax", "communicate", "daily", "learn", "Music", "取名", "物价对比"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_topic_max_tokens() -> u32 {
    50
}

fn default_topic_temperature() -> f32 {
    0.1
}

impl Default for TopicTaskConfig {
    fn default() -> Self {
        Self {
            column: default_content_column(),
            topics: default_topics(),
            prompt: None,
            max_tokens: default_topic_max_tokens(),
            temperature: default_topic_temperature(),
        }
    }
}

/// Sentiment-annotation task settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentTaskConfig {
    /// Input column holding the note's topic label
    #[serde(default = "default_topic_column")]
    pub topic_column: String,
    /// Input column holding the comment text
    #[serde(default = "default_comment_column")]
    pub comment_column: String,
    /// Custom prompt (uses {topic} and {comment} placeholders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_sentiment_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_sentiment_temperature")]
    pub temperature: f32,
}

fn default_topic_column() -> String {
    "笔记topic".to_string()
}

fn default_comment_column() -> String {
    "评论内容".to_string()
}

fn default_sentiment_max_tokens() -> u32 {
    200
}

fn default_sentiment_temperature() -> f32 {
    0.3
}

impl Default for SentimentTaskConfig {
    fn default() -> Self {
        Self {
            topic_column: default_topic_column(),
            comment_column: default_comment_column(),
            prompt: None,
            max_tokens: default_sentiment_max_tokens(),
            temperature: default_sentiment_temperature(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration.
    ///
    /// With an explicit path the file must exist. Otherwise `./annotate.toml`
    /// and then `<config dir>/batch-annotate/config.toml` are tried, falling
    /// back to defaults. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(&resolve_path(path))?,
            None => match discover_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        let config = config.with_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `ANNOTATE_*` overrides from a variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.llm = self.llm.with_overrides_from(&lookup);
        if let Some(n) = lookup("ANNOTATE_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.run.batch_size = n;
        }
        if let Some(n) = lookup("ANNOTATE_RETRY_TIMES").and_then(|v| v.parse().ok()) {
            self.run.retry_times = n;
        }
        if let Some(n) = lookup("ANNOTATE_RETRY_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.run.retry_backoff_ms = n;
        }
        if let Some(n) = lookup("ANNOTATE_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.run.request_delay_ms = n;
        }
        self
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.run.retry_times == 0 {
            return Err(ConfigError::Invalid("retry_times must be at least 1".into()));
        }
        if self.topics.topics.is_empty() {
            return Err(ConfigError::Invalid("topic list must not be empty".into()));
        }
        Ok(())
    }
}

/// Expand `~` in a user-supplied path.
pub fn resolve_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILENAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("batch-annotate").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.run.batch_size, 80);
        assert_eq!(config.run.retry_times, 3);
        assert_eq!(config.run.request_delay(), Duration::from_secs(2));
        assert_eq!(config.llm.timeout_secs, 10);
        assert_eq!(config.topics.topics.len(), 7);
        assert_eq!(config.topics.max_tokens, 50);
        assert_eq!(config.sentiment.max_tokens, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            [llm]
            model = "Qwen/Qwen2.5-7B-Instruct"

            [run]
            batch_size = 20

            [topics]
            topics = ["Music", "daily"]
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "Qwen/Qwen2.5-7B-Instruct");
        assert_eq!(config.llm.timeout_secs, 10);
        assert_eq!(config.run.batch_size, 20);
        assert_eq!(config.run.retry_times, 3);
        assert_eq!(config.topics.topics, vec!["Music", "daily"]);
        assert_eq!(config.topics.column, "combine_notes");
        assert_eq!(config.sentiment.comment_column, "评论内容");
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::default().with_overrides_from(|key| match key {
            "ANNOTATE_BATCH_SIZE" => Some("10".to_string()),
            "ANNOTATE_DELAY_MS" => Some("0".to_string()),
            "ANNOTATE_RETRY_TIMES" => Some("many".to_string()),
            "ANNOTATE_ENDPOINT" => Some("http://localhost:9000".to_string()),
            _ => None,
        });
        assert_eq!(config.run.batch_size, 10);
        assert_eq!(config.run.request_delay_ms, 0);
        assert_eq!(config.run.retry_times, 3);
        assert_eq!(config.llm.endpoint, "http://localhost:9000");
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = PipelineConfig::default();
        config.run.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
