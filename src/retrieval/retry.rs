//! Bounded retry policy for backend readiness checks.
//!
//! Retrieval calls made during an evaluation are never retried: a failed
//! query is skipped. Only the startup probe waits for the service to come up.

use crate::config::EvalSettings;
use crate::error::{EvalError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay multiplied by `factor` after each failure, capped at `max_delay`.
    Exponential { factor: u32, max_delay: Duration },
}

/// Retry policy with a maximum attempt count and a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Growth of the delay.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed-interval retries.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Doubling delay capped at `max_delay`.
    pub fn exponential(max_attempts: u32, initial: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: initial,
            backoff: Backoff::Exponential {
                factor: 2,
                max_delay,
            },
        }
    }

    /// Readiness policy from the evaluation settings.
    pub fn from_settings(settings: &EvalSettings) -> Self {
        Self::fixed(
            settings.ready_retries,
            Duration::from_millis(settings.ready_sleep_ms),
        )
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor, max_delay } => {
                let exponent = attempt.saturating_sub(1);
                let multiplier = factor.saturating_pow(exponent);
                self.delay.saturating_mul(multiplier).min(max_delay)
            }
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// Returns the value and the number of attempts used. Exhaustion yields
    /// [`EvalError::BackendUnavailable`] carrying the last error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => {
                    debug!(label, attempt, "attempt succeeded");
                    return Ok((value, attempt));
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, label, e
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }

        Err(EvalError::BackendUnavailable {
            endpoint: label.to_string(),
            reason: format!(
                "gave up after {} attempts: {}",
                self.max_attempts,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1500));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy =
            RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let (value, attempts) = policy
            .run("probe", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(EvalError::BackendUnavailable {
                            endpoint: "probe".to_string(),
                            reason: "not yet".to_string(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_terminal() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: Result<((), u32)> = policy
            .run("health", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EvalError::BackendUnavailable {
                        endpoint: "health".to_string(),
                        reason: "connection refused".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(EvalError::BackendUnavailable { reason, .. }) => {
                assert!(reason.contains("gave up after 3 attempts"));
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
