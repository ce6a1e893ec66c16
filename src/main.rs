//! annotate - resumable batch LLM annotation of tabular text.
//!
//! Reads rows from a CSV or xlsx file, asks a chat-completions endpoint to label each
//! one, and checkpoints the results so an interrupted run picks up where it
//! stopped.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "batch_annotate=info,annotate=info"
    } else {
        "batch_annotate=warn,annotate=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run().await
}
