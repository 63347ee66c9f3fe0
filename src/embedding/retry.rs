//! Retry with exponential backoff for transient provider failures

use super::backend::{Embedder, EmbeddingError, EmbeddingResult};
use crate::config::EmbeddingConfig;
use crate::types::Embedding;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

impl From<&EmbeddingConfig> for RetryPolicy {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry `attempt` (1-based), honoring a server-provided hint
    fn delay(&self, attempt: u32, error: &EmbeddingError) -> Duration {
        if let EmbeddingError::RateLimited {
            retry_after_ms: Some(ms),
        } = error
        {
            return Duration::from_millis(*ms).min(self.max_backoff);
        }
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// Returns the last error once retries are exhausted; permanent errors
    /// are returned immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> EmbeddingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = EmbeddingResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.delay(attempt, &e);
                    warn!(
                        "{} failed: {}, retrying in {:?} (attempt {}/{})",
                        what, e, backoff, attempt, self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Embed one text with retries
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    policy: &RetryPolicy,
    text: &str,
) -> EmbeddingResult<Embedding> {
    policy.run("Embedding request", move || embedder.embed(text)).await
}

/// Embed a batch with retries; the whole batch is retried on a transient failure
pub async fn embed_batch_with_retry(
    embedder: &dyn Embedder,
    policy: &RetryPolicy,
    texts: &[String],
) -> EmbeddingResult<Vec<Embedding>> {
    policy
        .run("Batch embedding request", move || embedder.embed_batch(texts))
        .await
}
