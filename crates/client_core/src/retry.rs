//! Bounded retry for idempotent reads.
//!
//! Attempt `n` (zero based) waits `base_delay * n` before it runs, so the
//! delay grows linearly. Only errors reporting [`ClientError::is_retryable`]
//! are retried; anything else ends the loop on its first occurrence.

use std::{future::Future, time::Duration};

use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            info!(
                label,
                attempt,
                max_retries = policy.max_retries,
                "retry: attempt"
            );
            tokio::time::sleep(policy.delay_before(attempt)).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %err,
                    "retry: transient backend failure"
                );
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn exhausted_or_fatal(err: &ClientError) -> &'static str {
    if err.is_retryable() {
        "retries exhausted"
    } else {
        "non-retryable failure"
    }
}
