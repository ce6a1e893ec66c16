//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use batch_annotate::{CompletionBackend, GenerationParams, LlmError, PipelineConfig};

/// Backend that answers from a closure over the prompt and counts calls.
///
/// Prompts containing `FAIL` always error. If `cancel_after` is set, the
/// shared flag is raised once that many calls have been made.
pub struct ScriptedBackend {
    reply: Box<dyn Fn(&str) -> String + Send + Sync>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    cancel: Option<(usize, Arc<AtomicBool>)>,
}

impl ScriptedBackend {
    pub fn new(reply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            cancel: None,
        }
    }

    /// Always answers `text`.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| text.clone())
    }

    pub fn cancel_after(mut self, calls: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some((calls, flag));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some((after, ref flag)) = self.cancel {
            if n >= after {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if prompt.contains("FAIL") {
            return Err(LlmError::Connection("connection reset".to_string()));
        }
        Ok((self.reply)(prompt))
    }
}

/// Config with no pauses so tests run instantly.
pub fn fast_config(batch_size: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.run.batch_size = batch_size;
    config.run.retry_backoff_ms = 0;
    config.run.request_delay_ms = 0;
    config
}

/// Write a one-column topic input with `count` posts.
pub fn write_posts(path: &Path, count: usize) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(["combine_notes", "note_id"]).unwrap();
    for i in 0..count {
        writer
            .write_record([format!("post number {}", i), format!("n{}", i)])
            .unwrap();
    }
    writer.flush().unwrap();
}

/// Read a CSV file back as raw records, header included.
pub fn read_table(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}
