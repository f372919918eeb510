//! Capped exponential backoff shared by every external call path.
//!
//! Quote fetches, swap builds and broadcasts all retry the same way: up to
//! three attempts, one second base delay doubling per attempt, capped at
//! eight seconds. A classifier decides which errors are worth retrying.

use std::future::Future;
use std::time::Duration;

/// Retry parameters for an external call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Timeout applied to each quote/swap HTTP call.
pub const EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `op` up to `policy.max_attempts` times, sleeping between attempts.
///
/// `is_transient` classifies errors; a fatal error aborts immediately. The
/// final error is returned once attempts are exhausted.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_transient(&err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(op = op_name, attempt, error = %err, "Giving up");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(8));
        assert_eq!(policy.delay_after(10), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_exactly_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_with_backoff(
            RetryPolicy::default(),
            "always-fails",
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_owned()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_with_backoff(
            RetryPolicy::default(),
            "fatal",
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("bad input".to_owned()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(
            RetryPolicy::default(),
            "flaky",
            |_| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_owned())
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
