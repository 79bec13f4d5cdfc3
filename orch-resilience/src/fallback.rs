//! Fallback router: ordered alternate agents tried when a step's primary
//! agent fails in a way one of the step's fallback predicates recognizes.

use orch_core::error::{OrchError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackPredicate {
    Timeout,
    Unavailable,
    CircuitBreakerOpen,
    ErrorRateAbove { threshold: f64 },
}

impl FallbackPredicate {
    /// Does this predicate match the given error (and, for `ErrorRateAbove`,
    /// the primary's current observed error rate)?
    pub fn matches(&self, error: &OrchError, observed_error_rate: f64) -> bool {
        match self {
            Self::Timeout => matches!(error, OrchError::Timeout(_)),
            Self::Unavailable => matches!(error, OrchError::Selection { .. }),
            Self::CircuitBreakerOpen => matches!(error, OrchError::CircuitOpen { .. }),
            Self::ErrorRateAbove { threshold } => observed_error_rate > *threshold,
        }
    }
}

/// Per-step fallback configuration: a primary agent, ordered alternates, and
/// the predicates that authorize falling over to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackStrategy {
    pub primary: String,
    pub alternates: Vec<String>,
    pub predicates: Vec<FallbackPredicate>,
}

impl FallbackStrategy {
    pub fn new(primary: impl Into<String>, alternates: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            alternates,
            predicates: vec![
                FallbackPredicate::Timeout,
                FallbackPredicate::Unavailable,
                FallbackPredicate::CircuitBreakerOpen,
            ],
        }
    }

    fn should_fall_over(&self, error: &OrchError, observed_error_rate: f64) -> bool {
        self.predicates
            .iter()
            .any(|p| p.matches(error, observed_error_rate))
    }
}

/// Invoke the primary via `invoke`, falling over to alternates in order when
/// the failure matches one of `strategy`'s predicates. The first alternate
/// that succeeds wins the whole call, transparently to the caller; if every
/// candidate fails, the *last* error observed is returned.
pub async fn invoke_with_fallback<T, F, Fut>(
    strategy: &FallbackStrategy,
    observed_error_rate: f64,
    mut invoke: F,
) -> Result<T>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let primary_err = match invoke(&strategy.primary).await {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    if !strategy.should_fall_over(&primary_err, observed_error_rate) {
        return Err(primary_err);
    }

    let mut last_err = primary_err;
    for alternate in &strategy.alternates {
        match invoke(alternate).await {
            Ok(value) => return Ok(value),
            Err(error) => last_err = error,
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn falls_over_to_working_alternate() {
        let strategy = FallbackStrategy::new("primary", vec!["alt1".to_string()]);
        let calls = AtomicUsize::new(0);

        let result = invoke_with_fallback(&strategy, 0.0, |agent_id| {
            calls.fetch_add(1, Ordering::SeqCst);
            let agent_id = agent_id.to_string();
            async move {
                if agent_id == "primary" {
                    Err(OrchError::Timeout(std::time::Duration::from_secs(1)))
                } else {
                    Ok(agent_id)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "alt1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_matching_error_does_not_fall_over() {
        let mut strategy = FallbackStrategy::new("primary", vec!["alt1".to_string()]);
        strategy.predicates = vec![FallbackPredicate::Timeout];

        let result: Result<&str> = invoke_with_fallback(&strategy, 0.0, |_| async {
            Err(OrchError::Validation("bad input".to_string()))
        })
        .await;

        assert!(result.is_err());
    }
}
