//! Bounded retry with exponential backoff.
//!
//! Every external call (embedding, language model, Slack Web API) goes
//! through one [`RetryPolicy`]. The caller supplies the operation and a
//! predicate deciding which errors are worth another attempt.
//!
//! Backoff doubles from `base_delay` on each retry: 1s, 2s, 4s, 8s, 16s,
//! 32s with the defaults, never exceeding `max_delay` and never more than
//! `2^5 × base_delay`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; it is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(5);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget is spent. The last error is returned.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestie_core::error::{Error, ServiceErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(1), Duration::from_secs(32))
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = policy(10);
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
        assert_eq!(p.delay_for(6), Duration::from_secs(32));
        assert_eq!(p.delay_for(9), Duration::from_secs(32));

        let tight = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(3));
        assert_eq!(tight.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(policy(0).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = policy(3)
            .run(
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::language_model(ServiceErrorKind::ServiceUnavailable, "down"))
                },
                Error::is_transient,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_rejected() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = policy(5)
            .run(
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::embedding(ServiceErrorKind::Rejected, "bad key"))
                },
                Error::is_transient,
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::Embedding {
                kind: ServiceErrorKind::Rejected,
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let start = tokio::time::Instant::now();
        let result: Result<u32, Error> = policy(4)
            .run(
                |attempt| async move {
                    if attempt < 3 {
                        Err(Error::embedding(ServiceErrorKind::RateLimited, "slow down"))
                    } else {
                        Ok(attempt)
                    }
                },
                Error::is_transient,
            )
            .await;
        assert_eq!(result.unwrap(), 3);
        // 1s + 2s of backoff under paused time.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
