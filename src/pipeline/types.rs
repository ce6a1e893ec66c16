//! Types shared by the pipeline driver and its consumers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::annotation::RecordStatus;
use crate::checkpoint::CheckpointError;

/// Events emitted while a run progresses.
/// Used by the CLI to drive the progress bar and status messages.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        total_rows: usize,
        resumed_from: usize,
    },
    RowStarted {
        index: usize,
    },
    RetryScheduled {
        index: usize,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: String,
        timed_out: bool,
    },
    RowRecorded {
        index: usize,
        status: RecordStatus,
    },
    Flushed {
        rows: usize,
    },
    Complete(RunSummary),
}

/// Counts for a finished (or stopped) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows in the selected input range.
    pub total_rows: usize,
    /// Rows already present in the output when the run began.
    pub resumed_from: usize,
    pub annotated: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub flushes: usize,
    pub output: PathBuf,
}

impl RunSummary {
    /// Rows processed by this run.
    pub fn processed(&self) -> usize {
        self.annotated + self.unmatched + self.failed
    }

    /// Rows in the output table, header excluded.
    pub fn rows_written(&self) -> usize {
        self.resumed_from + self.processed()
    }

    pub(crate) fn tally(&mut self, status: RecordStatus) {
        match status {
            RecordStatus::Annotated => self.annotated += 1,
            RecordStatus::Unmatched => self.unmatched += 1,
            RecordStatus::Failed => self.failed += 1,
        }
    }
}

/// Ways a run can fail to start or stop before reaching the last row.
///
/// Per-row request failures never show up here; they are recorded as
/// sentinel rows.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot resume: {0}")]
    Resume(#[source] CheckpointError),
    #[error("Run interrupted after {processed} rows ({}): {source}", saved_note(.saved))]
    Interrupted {
        processed: usize,
        saved: bool,
        summary: RunSummary,
        #[source]
        source: CheckpointError,
    },
    #[error("Run cancelled after {processed} rows ({})", saved_note(.saved))]
    Cancelled {
        processed: usize,
        saved: bool,
        summary: RunSummary,
    },
}

fn saved_note(saved: &bool) -> &'static str {
    if *saved {
        "buffered rows saved"
    } else {
        "final save failed"
    }
}

impl PipelineError {
    /// Counts at the point the run stopped; `None` if it never started.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            PipelineError::Resume(_) => None,
            PipelineError::Interrupted { summary, .. } | PipelineError::Cancelled { summary, .. } => {
                Some(summary)
            }
        }
    }
}
