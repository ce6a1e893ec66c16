//! Shared abstraction for annotation tasks.

use crate::llm::GenerationParams;
use crate::source::InputRow;

use super::annotator::Completion;

/// How a row ended up in the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Completion parsed into at least one real value.
    Annotated,
    /// Completion arrived but nothing usable could be extracted.
    Unmatched,
    /// Every attempt failed; the failure sentinel was recorded.
    Failed,
}

/// One output row plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub index: usize,
    pub cells: Vec<String>,
    pub status: RecordStatus,
}

/// A kind of annotation the pipeline can run.
///
/// Implementations are pure: they never perform I/O, so the same row and
/// completion always produce the same record.
pub trait AnnotationTask: Send + Sync {
    /// Short name used in logs and the CLI.
    fn name(&self) -> &str;

    /// Input columns that must be present.
    fn required_columns(&self) -> Vec<&str>;

    /// Output header, written as the first row of the table.
    fn header(&self) -> Vec<String>;

    /// Generation parameters for every request of this task.
    fn generation(&self) -> GenerationParams;

    /// Render the full prompt for a row.
    fn render_prompt(&self, row: &InputRow) -> String;

    /// Build the output row for a completion or failure.
    fn record(&self, row: &InputRow, completion: &Completion) -> AnnotationRecord;
}
