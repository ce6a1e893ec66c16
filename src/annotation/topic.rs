//! Topic matching: pick one label from a fixed vocabulary for a post.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::TopicTaskConfig;
use crate::llm::{truncate_content, GenerationParams, LlmConfig, DEFAULT_TOPIC_PROMPT};
use crate::source::InputRow;

use super::annotator::Completion;
use super::task::{AnnotationRecord, AnnotationTask, RecordStatus};

pub const NOT_RELEVANT: &str = "not_relevant";
pub const API_FAILED: &str = "api_failed";
pub const MATCH_FAILED: &str = "match_failed";

/// Tokens the model may answer with when no topic fits (compared after cleaning).
const NOT_RELEVANT_TOKENS: &[&str] = &["不相关", "notrelevant", "not_relevant"];

/// Everything that is neither a word character nor a CJK ideograph.
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\x{4e00}-\x{9fa5}]").unwrap());

/// Result of matching a completion against the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMatch {
    /// Canonical spelling from the vocabulary.
    Topic(String),
    NotRelevant,
    MatchFailed,
    ApiFailed,
}

impl TopicMatch {
    pub fn label(&self) -> &str {
        match self {
            TopicMatch::Topic(t) => t,
            TopicMatch::NotRelevant => NOT_RELEVANT,
            TopicMatch::MatchFailed => MATCH_FAILED,
            TopicMatch::ApiFailed => API_FAILED,
        }
    }
}

/// Match a raw completion against `topics`.
///
/// Punctuation and whitespace are stripped and the comparison ignores case.
/// The first topic that matches exactly wins.
pub fn parse_topic(raw: Option<&str>, topics: &[String]) -> TopicMatch {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return TopicMatch::ApiFailed,
    };

    let cleaned = NON_WORD.replace_all(raw, "").to_lowercase();

    if let Some(topic) = topics.iter().find(|t| t.to_lowercase() == cleaned) {
        return TopicMatch::Topic(topic.clone());
    }
    if NOT_RELEVANT_TOKENS.contains(&cleaned.as_str()) {
        return TopicMatch::NotRelevant;
    }
    TopicMatch::MatchFailed
}

/// Topic-matching task: `[content, matched_topic]`.
pub struct TopicTask {
    column: String,
    topics: Vec<String>,
    prompt: String,
    generation: GenerationParams,
    max_content_chars: usize,
}

impl TopicTask {
    pub fn new(config: &TopicTaskConfig, llm: &LlmConfig) -> Self {
        Self {
            column: config.column.clone(),
            topics: config.topics.clone(),
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_TOPIC_PROMPT.to_string()),
            generation: GenerationParams {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                top_p: llm.top_p,
            },
            max_content_chars: llm.max_content_chars,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

impl AnnotationTask for TopicTask {
    fn name(&self) -> &str {
        "topics"
    }

    fn required_columns(&self) -> Vec<&str> {
        vec![self.column.as_str()]
    }

    fn header(&self) -> Vec<String> {
        vec![self.column.clone(), "matched_topic".to_string()]
    }

    fn generation(&self) -> GenerationParams {
        self.generation
    }

    fn render_prompt(&self, row: &InputRow) -> String {
        let content = truncate_content(row.get(&self.column).trim(), self.max_content_chars);
        self.prompt
            .replace("{topic_list}", &self.topics.join(", "))
            .replace("{content}", content)
    }

    fn record(&self, row: &InputRow, completion: &Completion) -> AnnotationRecord {
        let matched = parse_topic(completion.text(), &self.topics);
        let status = match (&matched, completion) {
            (_, Completion::Failed { .. }) => RecordStatus::Failed,
            (TopicMatch::Topic(_) | TopicMatch::NotRelevant, _) => RecordStatus::Annotated,
            _ => RecordStatus::Unmatched,
        };
        AnnotationRecord {
            index: row.index,
            cells: vec![
                row.get(&self.column).trim().to_string(),
                matched.label().to_string(),
            ],
            status,
        }
    }
}
