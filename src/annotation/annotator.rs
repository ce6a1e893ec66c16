//! Retrying annotator.
//!
//! Wraps a `CompletionBackend` with the per-row retry policy. Failures never
//! escape: after the last attempt the caller gets `Completion::Failed` and
//! records a sentinel.

use std::time::Duration;

use tracing::debug;

use crate::llm::{CompletionBackend, GenerationParams, LlmError};

/// Attempts per row and the linear backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Wait after failed attempt `attempt` (1-based): `backoff * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Outcome of annotating one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Raw completion text, unparsed.
    Text(String),
    /// All attempts failed.
    Failed { attempts: u32, error: String },
}

impl Completion {
    pub fn text(&self) -> Option<&str> {
        match self {
            Completion::Text(t) => Some(t),
            Completion::Failed { .. } => None,
        }
    }
}

/// Passed to the retry callback before each backoff sleep.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a LlmError,
}

pub struct Annotator<'a, B: ?Sized> {
    backend: &'a B,
    policy: RetryPolicy,
}

impl<'a, B: CompletionBackend + ?Sized> Annotator<'a, B> {
    pub fn new(backend: &'a B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Request a completion, retrying failed attempts with linear backoff.
    pub async fn annotate<F>(
        &self,
        prompt: &str,
        params: &GenerationParams,
        mut on_retry: F,
    ) -> Completion
    where
        F: FnMut(RetryNotice<'_>),
    {
        let max_attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.backend.complete(prompt, params).await {
                Ok(text) => return Completion::Text(text),
                Err(error) if attempt >= max_attempts => {
                    debug!("Giving up after {} attempts: {}", attempt, error);
                    return Completion::Failed {
                        attempts: attempt,
                        error: error.to_string(),
                    };
                }
                Err(error) => {
                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, max_attempts, error, delay
                    );
                    on_retry(RetryNotice {
                        attempt,
                        max_attempts,
                        delay,
                        error: &error,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
