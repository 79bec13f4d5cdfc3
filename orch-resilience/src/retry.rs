//! Retry handler: wraps a fallible async call in a backoff/predicate loop.

use orch_core::error::{OrchError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
    Random,
}

/// Retry policy: how many attempts, how long to wait between them, and which
/// errors are worth retrying at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier `m` used by the exponential strategy (`d * m^attempt`).
    pub multiplier: f64,
    pub jitter: bool,
    /// Substrings that, if present in an error's message, mark it retryable
    /// in addition to the error-kind based check (`OrchError::is_retryable`).
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            retryable_patterns: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            strategy: BackoffStrategy::Fixed,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: false,
            retryable_patterns: Vec::new(),
        }
    }

    /// Is `error` worth retrying under this policy? By error kind, or by
    /// substring match against the configured patterns.
    pub fn is_retryable(&self, error: &OrchError) -> bool {
        if error.is_retryable() {
            return true;
        }
        let message = error.to_string();
        self.retryable_patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }

    /// Compute the delay before the given (zero-indexed) retry attempt,
    /// clamped to `max_delay` and jittered if enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Exponential => {
                self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32)
            }
            BackoffStrategy::Linear => self.initial_delay.as_secs_f64() * (attempt as f64 + 1.0),
            BackoffStrategy::Fixed => self.initial_delay.as_secs_f64(),
            BackoffStrategy::Random => {
                let lo = self.initial_delay.as_secs_f64();
                let hi = self.max_delay.as_secs_f64().max(lo);
                rand::thread_rng().gen_range(lo..=hi)
            }
        };

        let jittered = if self.jitter {
            let factor = 1.0 + rand::thread_rng().gen_range(-0.1..=0.1);
            (base * factor).max(0.0)
        } else {
            base
        };

        Duration::from_secs_f64(jittered).min(self.max_delay)
    }
}

/// Run `make_call` (a factory producing a fresh future per attempt, since a
/// `Future` cannot be polled twice) under the given retry policy. On the
/// first success the value is returned; once `max_retries` is exhausted the
/// last error is returned unchanged (retry is idempotent for pure calls: a
/// single successful trajectory returns exactly the value a lone call would,
/// with no doubled side effects on the success path).
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, mut make_call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match make_call().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_retries || !policy.is_retryable(&error) {
                    warn!(attempt, error = %error, "retry exhausted or non-retryable");
                    return Err(error);
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, error = %error, "retrying after delay");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            strategy: BackoffStrategy::Fixed,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
            jitter: false,
            retryable_patterns: vec!["transient".to_string()],
        };

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_policy(&policy, move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(OrchError::invocation("s1", "transient failure"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reraises_after_exhausting_retries() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<()> = retry_with_policy(&policy, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OrchError::Timeout(Duration::from_secs(1)))
            }
        })
        .await;

        assert!(result.is_err());
        // initial attempt + 2 retries = 3 calls
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exponential_delay_is_clamped() {
        let policy = RetryPolicy {
            max_retries: 10,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: false,
            retryable_patterns: Vec::new(),
        };
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }
}
