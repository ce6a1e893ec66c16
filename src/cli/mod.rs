//! CLI parser and command dispatch.

mod commands;
mod helpers;
pub mod progress;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use batch_annotate::config::resolve_path;
use batch_annotate::{AnnotationTask, PipelineConfig, RowRange, SentimentTask, TopicTask};

#[derive(Parser)]
#[command(name = "annotate")]
#[command(about = "Resumable LLM annotation of social-media posts and comments")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides ./annotate.toml discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// API base URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Bearer token for the completion API
    #[arg(long, global = true, env = "ANNOTATE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Save the output every N rows
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Attempts per row before recording a failure
    #[arg(long, global = true)]
    retry_times: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Pause after every row in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Match each post to one topic from a fixed list
    Topics {
        #[command(flatten)]
        run: RunArgs,
        /// Comma-separated topic vocabulary
        #[arg(long, value_delimiter = ',')]
        topics: Option<Vec<String>>,
        /// Input column holding the post text
        #[arg(long)]
        column: Option<String>,
    },

    /// Label each comment with sentiment, commenter origin and VAD scores
    Sentiment {
        #[command(flatten)]
        run: RunArgs,
        /// Input column holding the note topic
        #[arg(long)]
        topic_column: Option<String>,
        /// Input column holding the comment text
        #[arg(long)]
        comment_column: Option<String>,
    },

    /// Show how far an output file has progressed without calling the API
    Status {
        #[command(flatten)]
        range: RangeArgs,
        /// Task the output belongs to
        #[arg(long, value_enum, default_value_t = TaskKind::Topics)]
        task: TaskKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskKind {
    Topics,
    Sentiment,
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Input table (.csv or .xlsx)
    #[arg(short, long)]
    input: PathBuf,
    /// Output table, .csv or .xlsx (resumed if it already exists)
    #[arg(short, long)]
    output: PathBuf,
    /// First input row to process (0-based, inclusive)
    #[arg(long)]
    start: Option<usize>,
    /// Input row to stop before (exclusive)
    #[arg(long)]
    end: Option<usize>,
}

impl RangeArgs {
    pub fn input(&self) -> PathBuf {
        resolve_path(&self.input)
    }

    pub fn output(&self) -> PathBuf {
        resolve_path(&self.output)
    }

    pub fn range(&self) -> RowRange {
        RowRange::new(self.start, self.end)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    range: RangeArgs,
    /// Print the prompts for the first N rows and exit without calling the API
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "3")]
    dry_run: Option<usize>,
}

impl Cli {
    /// Build the run configuration: file and env first, then flags.
    fn build_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config =
            PipelineConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(ref endpoint) = self.endpoint {
            config.llm.endpoint = endpoint.clone();
        }
        if let Some(ref model) = self.model {
            config.llm.model = model.clone();
        }
        if let Some(ref key) = self.api_key {
            config.llm.api_key = Some(key.clone());
        }
        if let Some(n) = self.batch_size {
            config.run.batch_size = n;
        }
        if let Some(n) = self.retry_times {
            config.run.retry_times = n;
        }
        if let Some(n) = self.timeout_secs {
            config.llm.timeout_secs = n;
        }
        if let Some(n) = self.delay_ms {
            config.run.request_delay_ms = n;
        }

        match &self.command {
            Commands::Topics { topics, column, .. } => {
                if let Some(topics) = topics {
                    config.topics.topics = topics
                        .iter()
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                }
                if let Some(column) = column {
                    config.topics.column = column.clone();
                }
            }
            Commands::Sentiment {
                topic_column,
                comment_column,
                ..
            } => {
                if let Some(col) = topic_column {
                    config.sentiment.topic_column = col.clone();
                }
                if let Some(col) = comment_column {
                    config.sentiment.comment_column = col.clone();
                }
            }
            Commands::Status { .. } => {}
        }

        config.validate()?;
        Ok(config)
    }
}

fn build_task(kind: TaskKind, config: &PipelineConfig) -> Box<dyn AnnotationTask> {
    match kind {
        TaskKind::Topics => Box::new(TopicTask::new(&config.topics, &config.llm)),
        TaskKind::Sentiment => Box::new(SentimentTask::new(&config.sentiment, &config.llm)),
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.build_config()?;

    match cli.command {
        Commands::Topics { run, .. } => {
            let task = build_task(TaskKind::Topics, &config);
            commands::cmd_annotate(&config, task.as_ref(), &run.range, run.dry_run).await
        }
        Commands::Sentiment { run, .. } => {
            let task = build_task(TaskKind::Sentiment, &config);
            commands::cmd_annotate(&config, task.as_ref(), &run.range, run.dry_run).await
        }
        Commands::Status { range, task } => {
            let task = build_task(task, &config);
            commands::cmd_status(task.as_ref(), &range)
        }
    }
}
