//! Sentiment annotation: emotion label, commenter origin and VAD scores.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SentimentTaskConfig;
use crate::llm::{truncate_content, GenerationParams, LlmConfig, DEFAULT_SENTIMENT_PROMPT};
use crate::source::InputRow;

use super::annotator::Completion;
use super::task::{AnnotationRecord, AnnotationTask, RecordStatus};

/// Cell written for a field that is absent, and for every field of a failed row.
pub const ZERO_SENTINEL: &str = "0";

/// Upper bound of the valence/arousal/dominance scale.
const MAX_SCORE: u8 = 5;

pub const OUTPUT_FIELDS: [&str; 5] = ["sentiment", "user_origin", "valence", "arousal", "dominance"];

fn string_field(key: &str) -> Regex {
    Regex::new(&format!(r#"(?i)"{}"\s*:\s*"([^"]+)""#, key)).unwrap()
}

fn number_field(key: &str) -> Regex {
    Regex::new(&format!(r#"(?i)"{}"\s*:\s*"?([0-9０-９]+)"#, key)).unwrap()
}

static SENTIMENT: LazyLock<Regex> = LazyLock::new(|| string_field("sentiment"));
static USER_ORIGIN: LazyLock<Regex> = LazyLock::new(|| string_field("user_origin"));
static VALENCE: LazyLock<Regex> = LazyLock::new(|| number_field("valence"));
static AROUSAL: LazyLock<Regex> = LazyLock::new(|| number_field("arousal"));
static DOMINANCE: LazyLock<Regex> = LazyLock::new(|| number_field("dominance"));

/// Where the commenter appears to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOrigin {
    Chinese,
    Foreign,
    Unknown,
}

impl UserOrigin {
    /// Map a model label onto the enum; unrecognised labels are `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "中国用户" | "中国" | "chinese" => UserOrigin::Chinese,
            "外国用户" | "外国" | "foreign" => UserOrigin::Foreign,
            _ => UserOrigin::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserOrigin::Chinese => "chinese",
            UserOrigin::Foreign => "foreign",
            UserOrigin::Unknown => "unknown",
        }
    }
}

/// Fields extracted from a completion, before defaulting.
///
/// `None` means the key was not found. The output table writes `0` for
/// `None`, so an absent score and a returned zero look the same there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentimentFields {
    pub sentiment: Option<String>,
    pub user_origin: Option<UserOrigin>,
    pub valence: Option<u8>,
    pub arousal: Option<u8>,
    pub dominance: Option<u8>,
}

impl SentimentFields {
    pub fn is_empty(&self) -> bool {
        self.missing_fields().len() == OUTPUT_FIELDS.len()
    }

    /// Names of the keys that were not found.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let present = [
            self.sentiment.is_some(),
            self.user_origin.is_some(),
            self.valence.is_some(),
            self.arousal.is_some(),
            self.dominance.is_some(),
        ];
        OUTPUT_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, p)| !p)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Output cells in `OUTPUT_FIELDS` order, absent fields as `0`.
    pub fn cells(&self) -> Vec<String> {
        let score = |v: Option<u8>| v.map_or_else(|| ZERO_SENTINEL.to_string(), |n| n.to_string());
        vec![
            self.sentiment
                .clone()
                .unwrap_or_else(|| ZERO_SENTINEL.to_string()),
            self.user_origin
                .map_or_else(|| ZERO_SENTINEL.to_string(), |o| o.as_str().to_string()),
            score(self.valence),
            score(self.arousal),
            score(self.dominance),
        ]
    }

    /// Cells recorded when every attempt failed.
    pub fn failure_cells() -> Vec<String> {
        vec![ZERO_SENTINEL.to_string(); OUTPUT_FIELDS.len()]
    }
}

fn capture_string(re: &Regex, raw: &str) -> Option<String> {
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn capture_score(re: &Regex, raw: &str) -> Option<u8> {
    re.captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| score_value(m.as_str()))
}

/// ASCII or fullwidth digits, clamped to `MAX_SCORE`; overflow clamps too.
fn score_value(digits: &str) -> Option<u8> {
    let mut value: u64 = 0;
    for c in digits.chars() {
        let digit = match c {
            '0'..='9' => c as u64 - '0' as u64,
            '０'..='９' => c as u64 - '０' as u64,
            _ => return None,
        };
        value = value.saturating_mul(10).saturating_add(digit);
    }
    Some(value.min(u64::from(MAX_SCORE)) as u8)
}

/// Extract each key independently; a missing or malformed key leaves the
/// others untouched. Surrounding text is ignored.
pub fn parse_sentiment(raw: &str) -> SentimentFields {
    SentimentFields {
        sentiment: capture_string(&SENTIMENT, raw),
        user_origin: capture_string(&USER_ORIGIN, raw).map(|l| UserOrigin::from_label(&l)),
        valence: capture_score(&VALENCE, raw),
        arousal: capture_score(&AROUSAL, raw),
        dominance: capture_score(&DOMINANCE, raw),
    }
}

/// Sentiment task: `[topic, comment, sentiment, user_origin, valence, arousal, dominance]`.
pub struct SentimentTask {
    topic_column: String,
    comment_column: String,
    prompt: String,
    generation: GenerationParams,
    max_content_chars: usize,
}

impl SentimentTask {
    pub fn new(config: &SentimentTaskConfig, llm: &LlmConfig) -> Self {
        Self {
            topic_column: config.topic_column.clone(),
            comment_column: config.comment_column.clone(),
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SENTIMENT_PROMPT.to_string()),
            generation: GenerationParams {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                top_p: llm.top_p,
            },
            max_content_chars: llm.max_content_chars,
        }
    }
}

impl AnnotationTask for SentimentTask {
    fn name(&self) -> &str {
        "sentiment"
    }

    fn required_columns(&self) -> Vec<&str> {
        vec![self.topic_column.as_str(), self.comment_column.as_str()]
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec![self.topic_column.clone(), self.comment_column.clone()];
        header.extend(OUTPUT_FIELDS.iter().map(|f| f.to_string()));
        header
    }

    fn generation(&self) -> GenerationParams {
        self.generation
    }

    fn render_prompt(&self, row: &InputRow) -> String {
        let comment = truncate_content(row.get(&self.comment_column), self.max_content_chars);
        self.prompt
            .replace("{topic}", row.get(&self.topic_column))
            .replace("{comment}", comment)
    }

    fn record(&self, row: &InputRow, completion: &Completion) -> AnnotationRecord {
        let (derived, status) = match completion {
            Completion::Text(raw) => {
                let fields = parse_sentiment(raw);
                let status = if fields.is_empty() {
                    RecordStatus::Unmatched
                } else {
                    RecordStatus::Annotated
                };
                let missing = fields.missing_fields();
                if !missing.is_empty() {
                    tracing::debug!(
                        "Row {}: completion missing {}",
                        row.index,
                        missing.join(", ")
                    );
                }
                (fields.cells(), status)
            }
            Completion::Failed { .. } => (SentimentFields::failure_cells(), RecordStatus::Failed),
        };

        let mut cells = vec![
            row.get(&self.topic_column).to_string(),
            row.get(&self.comment_column).to_string(),
        ];
        cells.extend(derived);
        AnnotationRecord {
            index: row.index,
            cells,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(topic: &str, comment: &str) -> InputRow {
        let mut fields = HashMap::new();
        fields.insert("笔记topic".to_string(), topic.to_string());
        fields.insert("评论内容".to_string(), comment.to_string());
        InputRow::new(3, fields)
    }

    fn task() -> SentimentTask {
        SentimentTask::new(&SentimentTaskConfig::default(), &LlmConfig::default())
    }

    #[test]
    fn test_parse_full_completion() {
        let raw = r#"分析结果："sentiment":"感动","user_origin":"外国用户","valence":4,"arousal":3,"dominance":2"#;
        let fields = parse_sentiment(raw);
        assert_eq!(fields.sentiment.as_deref(), Some("感动"));
        assert_eq!(fields.user_origin, Some(UserOrigin::Foreign));
        assert_eq!(fields.valence, Some(4));
        assert_eq!(fields.arousal, Some(3));
        assert_eq!(fields.dominance, Some(2));
        assert!(fields.missing_fields().is_empty());
        assert_eq!(fields.cells(), vec!["感动", "foreign", "4", "3", "2"]);
    }

    #[test]
    fn test_parse_independent_defaults() {
        let fields = parse_sentiment(r#""sentiment":"感动""#);
        assert_eq!(fields.sentiment.as_deref(), Some("感动"));
        assert_eq!(fields.user_origin, None);
        assert_eq!(fields.valence, None);
        assert_eq!(
            fields.missing_fields(),
            vec!["user_origin", "valence", "arousal", "dominance"]
        );
        assert_eq!(fields.cells(), vec!["感动", "0", "0", "0", "0"]);
    }

    #[test]
    fn test_parse_tolerates_spacing_and_json_blocks() {
        let raw = "```json\n{\n  \"Sentiment\" : \"快乐\",\n  \"user_origin\": \"中国用户\",\n  \"valence\": \"5\",\n  \"arousal\": 9\n}\n```";
        let fields = parse_sentiment(raw);
        assert_eq!(fields.sentiment.as_deref(), Some("快乐"));
        assert_eq!(fields.user_origin, Some(UserOrigin::Chinese));
        assert_eq!(fields.valence, Some(5));
        // Out-of-scale scores are clamped
        assert_eq!(fields.arousal, Some(5));
        assert_eq!(fields.dominance, None);
    }

    #[test]
    fn test_malformed_key_does_not_affect_others() {
        let fields = parse_sentiment(r#""valence": high, "arousal": 2, "user_origin": "火星人""#);
        assert_eq!(fields.valence, None);
        assert_eq!(fields.arousal, Some(2));
        assert_eq!(fields.user_origin, Some(UserOrigin::Unknown));
    }

    #[test]
    fn test_explicit_zero_vs_missing() {
        let zero = parse_sentiment(r#""valence":0"#);
        let missing = parse_sentiment("");
        assert_eq!(zero.valence, Some(0));
        assert_eq!(missing.valence, None);
        assert_eq!(zero.cells()[2], missing.cells()[2]);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_score_overflow_and_fullwidth_digits() {
        let fields = parse_sentiment(
            r#""valence": 99999999999999999999999, "arousal": ４, "dominance": "７""#,
        );
        assert_eq!(fields.valence, Some(5));
        assert_eq!(fields.arousal, Some(4));
        assert_eq!(fields.dominance, Some(5));
        assert_eq!(fields.cells()[2..], ["5", "4", "5"]);
    }

    #[test]
    fn test_record_failure_sentinel() {
        let failed = Completion::Failed {
            attempts: 3,
            error: "timeout".into(),
        };
        let rec = task().record(&row("Music", "好听"), &failed);
        assert_eq!(rec.cells, vec!["Music", "好听", "0", "0", "0", "0", "0"]);
        assert_eq!(rec.status, RecordStatus::Failed);
    }

    #[test]
    fn test_record_unmatched() {
        let rec = task().record(&row("Music", "好听"), &Completion::Text("no idea".into()));
        assert_eq!(rec.status, RecordStatus::Unmatched);
        assert_eq!(rec.cells.len(), 7);
    }

    #[test]
    fn test_header_and_prompt() {
        let task = task();
        assert_eq!(
            task.header(),
            vec!["笔记topic", "评论内容", "sentiment", "user_origin", "valence", "arousal", "dominance"]
        );
        let prompt = task.render_prompt(&row("cattax", "I pay my cat tax"));
        assert!(prompt.contains("笔记topic: cattax"));
        assert!(prompt.contains("评论内容: I pay my cat tax"));
    }
}
