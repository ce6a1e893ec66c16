//! Progress report for an output file.

use anyhow::Context;
use console::style;

use batch_annotate::checkpoint::read_existing;
use batch_annotate::{load_rows, AnnotationTask};

use crate::cli::RangeArgs;

/// Show how many rows of `range.input` are already in `range.output`.
pub fn cmd_status(task: &dyn AnnotationTask, range: &RangeArgs) -> anyhow::Result<()> {
    let input = range.input();
    let output = range.output();

    let rows = load_rows(&input, &task.required_columns(), range.range())
        .with_context(|| format!("Cannot inspect {} input", task.name()))?;
    let existing = read_existing(&output)?;

    println!(
        "\n{}",
        style(format!("Annotation Status: {}", task.name())).bold()
    );
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Input:", input.display());
    println!("{:<20} {}", "Input Rows:", rows.len());
    println!("{:<20} {}", "Output:", output.display());

    let Some(existing) = existing else {
        println!("{:<20} {}", "Status:", style("Not Started").dim());
        return Ok(());
    };

    let done = existing.rows.len();
    let remaining = rows.len().saturating_sub(done);
    let status_str = if remaining == 0 {
        style("Complete").green().to_string()
    } else if done > 0 {
        style("Needs Resume").yellow().to_string()
    } else {
        style("Not Started").dim().to_string()
    };

    println!("{:<20} {}", "Status:", status_str);
    println!("{:<20} {}", "Rows Written:", done);
    println!("{:<20} {}", "Rows Remaining:", remaining);

    let expected = task.header();
    if !existing.header.is_empty() && existing.header != expected {
        println!(
            "{} Output header does not match {} columns: {}",
            style("!").yellow(),
            task.name(),
            existing.header.join(",")
        );
        println!("  Expected: {}", expected.join(","));
    }
    if done > rows.len() {
        println!(
            "{} Output holds more rows than the selected input range",
            style("!").yellow()
        );
    }

    Ok(())
}
