//! Retry policy
//!
//! Bounded exponential backoff as an explicit configuration value, so the
//! pipeline's retry behaviour can be tested without running the pipeline.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (1 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: u32,
    /// Upper bound on any single delay
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: 3 attempts, 100ms doubling, capped at 5s
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2,
            max_delay: Duration::from_secs(5),
        }
    }

    /// Single attempt, never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_factor: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: delay,
            backoff_factor: 1,
            max_delay: delay,
        }
    }

    /// Set total attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay to wait after the zero-based `attempt` failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_factor.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, `should_retry` refuses the error, or
    /// the attempt budget is spent.
    pub async fn execute<F, Fut, T, E, R>(
        &self,
        mut operation: F,
        should_retry: R,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    }
                }
                Err(err) => {
                    if attempt + 1 >= max_attempts || !should_retry(&err) {
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt + 1,
                        };
                    }

                    let delay = self.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

/// Result of a retried operation together with how many attempts it took
#[derive(Debug, Clone)]
pub struct RetryOutcome<T, E> {
    /// Final result (success or last error)
    pub result: Result<T, E>,
    /// Number of attempts made
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    /// Whether more than one attempt was needed
    pub fn had_retries(&self) -> bool {
        self.attempts > 1
    }

    /// Discard the attempt count
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy::exponential()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(Duration::from_millis(20));
        assert_eq!(policy.delay_for(0), policy.delay_for(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let outcome = RetryPolicy::exponential()
            .with_max_attempts(5)
            .execute(
                move |_| async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.had_retries());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_budget_spent() {
        let outcome: RetryOutcome<(), &str> = RetryPolicy::exponential()
            .with_max_attempts(4)
            .execute(|_| async { Err("down") }, |_| true)
            .await;
        assert_eq!(outcome.attempts, 4);
        assert!(outcome.result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let outcome: RetryOutcome<(), &str> = RetryPolicy::exponential()
            .with_max_attempts(10)
            .execute(|_| async { Err("invalid") }, |e| *e != "invalid")
            .await;
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_policy_toml_roundtrip_uses_millis() {
        let policy = RetryPolicy::exponential();
        let text = toml::to_string(&policy).unwrap();
        assert!(text.contains("initial_delay_ms = 100"));
        let back: RetryPolicy = toml::from_str(&text).unwrap();
        assert_eq!(back, policy);
    }
}
