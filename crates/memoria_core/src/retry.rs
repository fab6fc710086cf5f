//! crates/memoria_core/src/retry.rs
//!
//! Exponential backoff for transient platform failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::PlatformError;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each retry after it.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable code, or the
/// policy's retries are used up. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<PlatformError>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let err: PlatformError = err.into();
                if attempt >= policy.max_retries || !err.is_retryable() {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    code = %err.code,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Transient platform error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_with_doubling_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let counter = calls.clone();
        let result = retry_with_backoff(RetryPolicy::default(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(PortError::platform("firestore/unavailable", "down"))
                } else {
                    Ok("listo")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("listo"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1000ms + 2000ms of backoff.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::default(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PortError::Timeout("slow".into()))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code, "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = Instant::now();
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::default(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PortError::Unauthorized)
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code, "permission-denied");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
