//! Annotation command: runs the pipeline with a progress bar.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;

use batch_annotate::annotation::RecordStatus;
use batch_annotate::checkpoint::read_existing;
use batch_annotate::{
    load_rows, AnnotationTask, InputRow, LlmClient, Pipeline, PipelineConfig, PipelineError,
    PipelineEvent, RunSummary,
};

use crate::cli::helpers::{print_summary, truncate};
use crate::cli::progress::{finish_row_progress, start_row_progress};
use crate::cli::RangeArgs;
use crate::progress_println;

/// Annotate the rows of `range.input` into `range.output`.
pub async fn cmd_annotate(
    config: &PipelineConfig,
    task: &dyn AnnotationTask,
    range: &RangeArgs,
    dry_run: Option<usize>,
) -> anyhow::Result<()> {
    let input = range.input();
    let output = range.output();

    let rows = load_rows(&input, &task.required_columns(), range.range())
        .with_context(|| format!("Cannot start {} run", task.name()))?;
    println!(
        "{} Loaded {} rows from {}",
        style("✓").green(),
        rows.len(),
        input.display()
    );

    if let Some(count) = dry_run {
        let (done, pending) = pending_rows(&rows, &output);
        print_prompts(task, pending, count, done);
        return Ok(());
    }

    if config.llm.api_key.is_none() {
        println!("{} {}", style("✗").red(), config.llm.availability_hint());
        anyhow::bail!("no API key configured");
    }

    let client = LlmClient::new(config.llm.clone())?;
    println!(
        "{} Using {} (model: {}, timeout: {}s, retries: {}, save every {} rows)",
        style("→").cyan(),
        config.llm.endpoint,
        config.llm.model,
        config.llm.timeout_secs,
        config.run.retry_times,
        config.run.batch_size
    );

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(cancel.clone());

    let (event_tx, event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let event_handler = tokio::spawn(handle_events(event_rx));

    let pipeline = Pipeline::new(config, &client)
        .with_events(event_tx)
        .with_cancel_flag(cancel);
    let result = pipeline.run(task, &rows, &output).await;
    // Closing the channel lets the handler finish
    drop(pipeline);
    let _ = event_handler.await;

    report(result, &output)
}

fn report(result: Result<RunSummary, PipelineError>, output: &Path) -> anyhow::Result<()> {
    match result {
        Ok(summary) => {
            if summary.processed() == 0 {
                println!(
                    "{} Nothing to do: {} already holds {} rows",
                    style("!").yellow(),
                    output.display(),
                    summary.resumed_from
                );
            } else {
                println!("{} All rows processed", style("✓").green());
            }
            print_summary(&summary);
            Ok(())
        }
        Err(err @ PipelineError::Cancelled { .. }) => {
            println!("{} {}", style("!").yellow(), err);
            if let Some(summary) = err.summary() {
                print_summary(summary);
            }
            println!("  Run the same command again to continue");
            Ok(())
        }
        Err(err) => {
            println!("{} {}", style("✗").red(), err);
            if let Some(summary) = err.summary() {
                print_summary(summary);
            }
            Err(err.into())
        }
    }
}

/// Rows a run against `output` would still send, after the ones already saved.
fn pending_rows<'r>(rows: &'r [InputRow], output: &Path) -> (usize, &'r [InputRow]) {
    let done = read_existing(output)
        .ok()
        .flatten()
        .map_or(0, |table| table.rows.len());
    (done, rows.get(done..).unwrap_or(&[]))
}

fn print_prompts(task: &dyn AnnotationTask, rows: &[InputRow], count: usize, done: usize) {
    if done > 0 {
        println!(
            "{} Skipping {} rows already in the output",
            style("→").cyan(),
            done
        );
    }
    for row in rows.iter().take(count) {
        println!(
            "{} Row {} ({})",
            style("→").cyan(),
            row.index,
            task.name()
        );
        println!("{}", task.render_prompt(row));
    }
    println!(
        "{} Dry run: {} of {} pending prompts shown, no requests sent",
        style("!").yellow(),
        count.min(rows.len()),
        rows.len()
    );
}

/// First Ctrl-C stops after the current row and saves; a second one exits.
fn spawn_interrupt_listener(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        cancel.store(true, Ordering::SeqCst);
        progress_println!(
            "{} Stopping after the current row (Ctrl-C again to abort without saving)",
            style("!").yellow()
        );
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

async fn handle_events(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) {
    let mut bar = None;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Started {
                total_rows,
                resumed_from,
            } => {
                if resumed_from > 0 {
                    progress_println!(
                        "{} Resuming from row {} of {}",
                        style("→").cyan(),
                        resumed_from + 1,
                        total_rows
                    );
                }
                bar = Some(start_row_progress(total_rows, resumed_from));
            }
            PipelineEvent::RowStarted { index } => {
                if let Some(ref bar) = bar {
                    bar.set_message(format!("row {}", index));
                }
            }
            PipelineEvent::RetryScheduled {
                index,
                attempt,
                max_attempts,
                delay,
                error,
                timed_out,
            } => {
                let what = if timed_out { "timed out" } else { "failed" };
                progress_println!(
                    "{} Row {} {} (attempt {}/{}), retrying in {:?}: {}",
                    style("!").yellow(),
                    index,
                    what,
                    attempt,
                    max_attempts,
                    delay,
                    truncate(&error, 80)
                );
            }
            PipelineEvent::RowRecorded { index, status } => {
                if status == RecordStatus::Failed {
                    progress_println!(
                        "{} Row {} exhausted retries, recorded as failed",
                        style("✗").red(),
                        index
                    );
                }
                if let Some(ref bar) = bar {
                    bar.inc(1);
                }
            }
            PipelineEvent::Flushed { rows } => {
                if let Some(ref bar) = bar {
                    bar.set_message(format!("saved {} rows", rows));
                }
            }
            PipelineEvent::Complete(_) => {}
        }
    }
    if let Some(ref bar) = bar {
        finish_row_progress(bar);
    }
}
