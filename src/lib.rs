//! batch-annotate - resumable LLM annotation of social-media posts and comments.
//!
//! Rows are read from a CSV or xlsx input, sent one at a time to an OpenAI-compatible
//! chat-completions endpoint, parsed into typed fields, and checkpointed into a
//! table (CSV or xlsx, by extension) that a later run can resume from.

pub mod annotation;
pub mod checkpoint;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod source;
pub mod table;

pub use annotation::{AnnotationTask, SentimentTask, TopicTask};
pub use checkpoint::CheckpointStore;
pub use config::PipelineConfig;
pub use llm::{CompletionBackend, GenerationParams, LlmClient, LlmConfig, LlmError};
pub use pipeline::{Pipeline, PipelineError, PipelineEvent, RunSummary};
pub use source::{load_rows, InputRow, RowRange, SourceError};
