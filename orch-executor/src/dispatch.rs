//! Single-invocation dispatch: selection, then retry wrapping fallback
//! wrapping the circuit breaker and the actual agent call, bracketed by a
//! load-counter guard (§4.3/§4.4).

use crate::{AgentInvoker, ExecutorDeps};
use orch_core::error::{OrchError, Result};
use orch_core::types::Step;
use orch_core::value::Value;
use orch_registry::WorkloadGuard;
use orch_resilience::fallback::{invoke_with_fallback, FallbackStrategy};
use orch_resilience::retry::retry_with_policy;

async fn call_agent(agent_id: &str, input: Value, deps: &ExecutorDeps<'_>) -> Result<Value> {
    if deps.cancellation.as_ref().map(|c| c.is_cancelled()).unwrap_or(false) {
        return Err(OrchError::Cancelled);
    }

    let _guard = WorkloadGuard::enter(deps.registry, agent_id);
    let breaker = deps.circuit_breakers.get_or_create(agent_id);
    breaker.call(agent_id, deps.invoker.invoke(agent_id, input)).await
}

/// Select an agent for `step`, then invoke it under the full resilience
/// stack. `input` is cloned once per retry attempt (and once per fallback
/// alternate), matching "retry is idempotent for pure calls" — no attempt
/// observes another attempt's mutation.
pub async fn dispatch_single(step: &Step, input: Value, deps: &ExecutorDeps<'_>) -> Result<Value> {
    let agent = orch_selector::select_for_step(
        step,
        &deps.selector_options,
        deps.registry,
        deps.health_source,
        deps.scoring_weights,
    )
    .await
    .ok_or_else(|| OrchError::selection(&step.step_id, "no suitable agent found"))?;

    let fallback_config = deps.fallbacks.get(&step.step_id);
    let retry_policy = deps.retry_policy_for(&step.step_id);

    retry_with_policy(&retry_policy, || {
        let input = input.clone();
        let primary = agent.agent_id.clone();
        async move {
            match fallback_config {
                Some(config) => {
                    let strategy = FallbackStrategy {
                        primary: primary.clone(),
                        alternates: config.alternates.clone(),
                        predicates: config.predicates.clone(),
                    };
                    invoke_with_fallback(&strategy, 0.0, |agent_id| {
                        call_agent(agent_id, input.clone(), deps)
                    })
                    .await
                }
                None => call_agent(&primary, input, deps).await,
            }
        }
    })
    .await
}
