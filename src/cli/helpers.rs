//! Shared helper functions for CLI commands.

use console::style;

use batch_annotate::RunSummary;

/// Truncate to `max_chars` characters, adding an ellipsis when shortened.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let flat: String = s.chars().map(|c| if c.is_control() { ' ' } else { c }).collect();
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let kept: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

/// Print the end-of-run summary block.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "  {} annotated, {} unmatched, {} failed ({} processed this run)",
        style(summary.annotated).green(),
        style(summary.unmatched).yellow(),
        style(summary.failed).red(),
        summary.processed()
    );
    println!(
        "  {} rows in {} ({} saves)",
        summary.rows_written(),
        summary.output.display(),
        summary.flushes
    );
}
