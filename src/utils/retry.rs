//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter. Only idempotent reads
//! are retried; writes surface their first failure.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::error::{ErrorKind, Result, RewardsError};

/// Backoff for idempotent reads against the backing store.
///
/// - Min delay: 20ms
/// - Max delay: 500ms
/// - Max attempts: 3
/// - Jitter enabled
pub fn read_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(500))
        .with_max_times(3)
        .with_jitter()
}

/// Backoff for connecting to the store at startup.
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(10)
        .with_jitter()
}

/// Only storage faults can succeed on a second attempt. Domain rejections
/// never will.
pub fn is_retryable(err: &RewardsError) -> bool {
    err.kind() == ErrorKind::StorageFailure
}

/// Run an idempotent read, retrying transient storage faults.
pub async fn retry_read<T, F, Fut>(op: &'static str, read: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    read.retry(read_backoff())
        .when(is_retryable)
        .notify(|err: &RewardsError, dur: Duration| {
            warn!(op, error = %err, delay = ?dur, "Read failed, retrying");
        })
        .await
}
