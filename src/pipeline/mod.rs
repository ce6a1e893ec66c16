//! Pipeline driver.
//!
//! Processes rows strictly in order: render prompt, request with retry, parse,
//! append to the checkpoint buffer, flush every `batch_size` rows, pause for
//! the rate limit. The pause follows every row whatever its outcome, except
//! the last row of a run, where nothing follows. Every row ends up recorded;
//! only checkpoint I/O failures or cancellation stop a run early, and both
//! trigger a best-effort save first. An existing output with another task's
//! header is refused before any request is sent.

mod types;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::annotation::{AnnotationTask, Annotator, RetryPolicy};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::PipelineConfig;
use crate::llm::CompletionBackend;
use crate::source::InputRow;

pub use types::{PipelineError, PipelineEvent, RunSummary};

/// Why the row loop stopped early.
enum Stop {
    Cancelled,
    Checkpoint(CheckpointError),
}

/// Sequential annotation driver for one output table.
pub struct Pipeline<'a, B: ?Sized> {
    config: &'a PipelineConfig,
    backend: &'a B,
    events: Option<UnboundedSender<PipelineEvent>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, B: CompletionBackend + ?Sized> Pipeline<'a, B> {
    pub fn new(config: &'a PipelineConfig, backend: &'a B) -> Self {
        Self {
            config,
            backend,
            events: None,
            cancel: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Stop before the next row once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Annotate `rows` into the table at `output`, resuming after whatever a
    /// previous run already flushed there.
    pub async fn run(
        &self,
        task: &dyn AnnotationTask,
        rows: &[InputRow],
        output: &Path,
    ) -> Result<RunSummary, PipelineError> {
        let mut store =
            CheckpointStore::resume(output, task.header()).map_err(PipelineError::Resume)?;
        let resumed_from = store.resume_offset();

        let mut summary = RunSummary {
            total_rows: rows.len(),
            resumed_from,
            output: output.to_path_buf(),
            ..Default::default()
        };

        if resumed_from > rows.len() {
            warn!(
                "{} already holds {} rows but the input range has {}; nothing to do",
                output.display(),
                resumed_from,
                rows.len()
            );
        } else if resumed_from > 0 {
            info!(
                "Resuming {} at row {} of {}",
                task.name(),
                resumed_from + 1,
                rows.len()
            );
        }

        self.emit(PipelineEvent::Started {
            total_rows: rows.len(),
            resumed_from: resumed_from.min(rows.len()),
        });

        let pending = rows.get(resumed_from..).unwrap_or(&[]);
        let outcome = self.process(task, pending, &mut store, &mut summary).await;

        let result = match outcome {
            Ok(()) => match store.flush() {
                Ok(()) => {
                    summary.flushes = store.flush_count();
                    self.emit(PipelineEvent::Flushed { rows: store.len() });
                    Ok(summary)
                }
                Err(e) => Err(self.stop_with_save(&mut store, summary, Stop::Checkpoint(e))),
            },
            Err(stop) => Err(self.stop_with_save(&mut store, summary, stop)),
        };

        if let Ok(ref summary) = result {
            info!(
                "{} complete: {} rows processed, {} in {}",
                task.name(),
                summary.processed(),
                summary.rows_written(),
                output.display()
            );
            self.emit(PipelineEvent::Complete(summary.clone()));
        }
        result
    }

    async fn process(
        &self,
        task: &dyn AnnotationTask,
        rows: &[InputRow],
        store: &mut CheckpointStore,
        summary: &mut RunSummary,
    ) -> Result<(), Stop> {
        let run = &self.config.run;
        let annotator = Annotator::new(
            self.backend,
            RetryPolicy::new(run.retry_times, run.retry_backoff()),
        );
        let params = task.generation();
        let batch_size = run.batch_size.max(1);
        let delay = run.request_delay();

        for (position, row) in rows.iter().enumerate() {
            if self.is_cancelled() {
                return Err(Stop::Cancelled);
            }

            self.emit(PipelineEvent::RowStarted { index: row.index });
            let prompt = task.render_prompt(row);
            let completion = annotator
                .annotate(&prompt, &params, |notice| {
                    self.emit(PipelineEvent::RetryScheduled {
                        index: row.index,
                        attempt: notice.attempt,
                        max_attempts: notice.max_attempts,
                        delay: notice.delay,
                        error: notice.error.to_string(),
                        timed_out: notice.error.is_timeout(),
                    })
                })
                .await;

            let record = task.record(row, &completion);
            debug!("Row {} recorded as {:?}", record.index, record.status);
            summary.tally(record.status);
            store.append(record.cells);
            self.emit(PipelineEvent::RowRecorded {
                index: record.index,
                status: record.status,
            });

            if store.len() % batch_size == 0 {
                store.flush().map_err(Stop::Checkpoint)?;
                summary.flushes = store.flush_count();
                self.emit(PipelineEvent::Flushed { rows: store.len() });
            }

            let is_last = position + 1 == rows.len();
            if !is_last && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    /// Best-effort save of the buffer after the loop stopped early.
    fn stop_with_save(
        &self,
        store: &mut CheckpointStore,
        mut summary: RunSummary,
        stop: Stop,
    ) -> PipelineError {
        let saved = match store.flush() {
            Ok(()) => true,
            Err(e) => {
                error!("Could not save buffered rows: {}", e);
                false
            }
        };
        summary.flushes = store.flush_count();
        let processed = summary.processed();

        match stop {
            Stop::Cancelled => {
                warn!(
                    "Cancelled after {} rows; {} rows in {}",
                    processed,
                    store.len(),
                    store.path().display()
                );
                PipelineError::Cancelled {
                    processed,
                    saved,
                    summary,
                }
            }
            Stop::Checkpoint(source) => {
                warn!(
                    "Interrupted after {} rows: {}; partial results {}",
                    processed,
                    source,
                    if saved { "saved" } else { "may be lost" }
                );
                PipelineError::Interrupted {
                    processed,
                    saved,
                    summary,
                    source,
                }
            }
        }
    }
}
