//! Retry-aware object transfer.
//!
//! Downloads are retried with exponential backoff because input objects
//! are the only copy of the user's photos. Uploads and deletes are a
//! single attempt: the caller still holds the bytes and can rerun the
//! whole stage.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;
use crate::storage::ObjectStore;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Tunable parameters for download retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(ms as u64)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Download of {key} failed after {attempts} attempts: {source}")]
    DownloadFailed {
        key: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("Upload of {key} failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Delete of {key} failed: {source}")]
    DeleteFailed {
        key: String,
        #[source]
        source: StorageError,
    },
}

// ---------------------------------------------------------------------------
// ObjectFetcher
// ---------------------------------------------------------------------------

/// Object transfers with the download/upload retry asymmetry applied.
#[derive(Clone)]
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl ObjectFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Download `key`, retrying with exponential backoff.
    ///
    /// Returns the last underlying error once all attempts are spent.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.store.get_object(key).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::info!(key, attempt, "Download succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Download attempt failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(key, attempts = attempt, error = %e, "Download failed after all retries");
                    return Err(FetchError::DownloadFailed {
                        key: key.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Upload `body` to `key` in a single attempt.
    pub async fn upload(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), FetchError> {
        let size = body.len();
        self.store
            .put_object(key, body, content_type)
            .await
            .map_err(|source| FetchError::UploadFailed {
                key: key.to_string(),
                source,
            })?;
        tracing::debug!(key, size, "Object uploaded");
        Ok(())
    }

    /// Delete `key` in a single attempt.
    pub async fn delete(&self, key: &str) -> Result<(), FetchError> {
        self.store
            .delete_object(key)
            .await
            .map_err(|source| FetchError::DeleteFailed {
                key: key.to_string(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
