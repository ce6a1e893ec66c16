//! Annotation tasks and the retrying annotator.
//!
//! A task knows which input columns it needs, how to render a prompt for a
//! row, and how to turn a completion (or a failure) into output cells. The
//! annotator owns the retry policy and is shared by all tasks.

mod annotator;
mod sentiment;
mod task;
mod topic;

pub use annotator::{Annotator, Completion, RetryNotice, RetryPolicy};
pub use sentiment::{parse_sentiment, SentimentFields, SentimentTask, UserOrigin};
pub use task::{AnnotationRecord, AnnotationTask, RecordStatus};
pub use topic::{parse_topic, TopicMatch, TopicTask};
