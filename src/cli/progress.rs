//! Row progress display.
//!
//! Also provides a global progress context so messages printed from any part
//! of the CLI do not tear the active bar.

use std::sync::{OnceLock, RwLock};

use indicatif::{ProgressBar, ProgressStyle};

/// Global reference to the active progress bar for coordinating output.
static ACTIVE_PROGRESS: OnceLock<RwLock<Option<ProgressBar>>> = OnceLock::new();

fn get_active_progress() -> &'static RwLock<Option<ProgressBar>> {
    ACTIVE_PROGRESS.get_or_init(|| RwLock::new(None))
}

/// Set the global active progress bar.
pub fn set_active_progress(bar: Option<ProgressBar>) {
    if let Ok(mut guard) = get_active_progress().write() {
        *guard = bar;
    }
}

/// Print a message above the active progress bar.
/// Falls back to println! if no bar is active.
pub fn progress_println(message: &str) {
    if let Ok(guard) = get_active_progress().read() {
        if let Some(ref bar) = *guard {
            bar.println(message);
            return;
        }
    }
    println!("{}", message);
}

/// Macro for printing that coordinates with the progress display.
#[macro_export]
macro_rules! progress_println {
    ($($arg:tt)*) => {
        $crate::cli::progress::progress_println(&format!($($arg)*))
    };
}

/// Create the per-row bar, starting at the resume offset, and make it active.
pub fn start_row_progress(total: usize, initial: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} ({eta}) {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    bar.set_position(initial as u64);
    bar.reset_eta();
    bar.set_message("Annotating...");
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    set_active_progress(Some(bar.clone()));
    bar
}

/// Clear the bar and unregister it.
pub fn finish_row_progress(bar: &ProgressBar) {
    bar.finish_and_clear();
    set_active_progress(None);
}
