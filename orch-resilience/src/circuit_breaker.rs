//! Per-target circuit breaker, grounded on the connection pool's breaker but
//! extended with a half-open success counter and a half-open concurrency cap
//! (§4.4).

use dashmap::DashMap;
use orch_core::error::{OrchError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub half_open_max: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            half_open_max: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A single named breaker instance.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failures: AtomicU32,
    half_open_successes: AtomicU32,
    last_failure_time: RwLock<Option<Instant>>,
    half_open_permits: Semaphore,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            half_open_permits: Semaphore::new(config.half_open_max as usize),
            config,
            state: RwLock::new(CircuitState::Closed),
            failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            last_failure_time: RwLock::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    /// Whether a call may proceed right now, performing the
    /// open -> half_open transition (on timeout elapse) as a side effect,
    /// exactly as the next attempted call after timeout is specified to do.
    fn can_proceed(&self) -> bool {
        let mut state = self.state.write();
        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_time
                    .read()
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if elapsed {
                    *state = CircuitState::HalfOpen;
                    self.half_open_successes.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.write();
        match *state {
            CircuitState::Closed => {
                self.failures.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    *state = CircuitState::Closed;
                    self.failures.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        *self.last_failure_time.write() = Some(Instant::now());
        let mut state = self.state.write();
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
            }
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    *state = CircuitState::Open;
                    warn!(failures, "circuit breaker opened");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Run `call` through the breaker: rejects immediately if open, caps
    /// concurrent half-open probes at `half_open_max`, and records the
    /// outcome against the state machine.
    pub async fn call<T, Fut>(&self, target: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if !self.can_proceed() {
            return Err(OrchError::CircuitOpen {
                target: target.to_string(),
            });
        }

        let _permit = if self.state() == CircuitState::HalfOpen {
            match self.half_open_permits.try_acquire() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    return Err(OrchError::CircuitOpen {
                        target: target.to_string(),
                    });
                }
            }
        } else {
            None
        };

        match call.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }
}

/// Lazily instantiates and owns one `CircuitBreaker` per target (typically
/// an agent id), shared process-wide (§5 "Shared resources").
#[derive(Clone)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(DashMap::new()),
        }
    }

    pub fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }

    pub fn state_of(&self, target: &str) -> CircuitState {
        self.breakers
            .get(target)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            half_open_max: 3,
            success_threshold: 1,
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            let _ = breaker
                .call("t", async { Err::<(), _>(OrchError::invocation("s", "boom")) })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call("t", async { Ok::<_, OrchError>(1) }).await;
        assert!(matches!(result, Err(OrchError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn transitions_to_half_open_then_closed() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            let _ = breaker
                .call("t", async { Err::<(), _>(OrchError::invocation("s", "boom")) })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = breaker.call("t", async { Ok::<_, OrchError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            let _ = breaker
                .call("t", async { Err::<(), _>(OrchError::invocation("s", "boom")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let _ = breaker
            .call("t", async { Err::<(), _>(OrchError::invocation("s", "still broken")) })
            .await;

        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
