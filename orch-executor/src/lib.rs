//! DAG traversal and per-step dispatch (§4.3): evaluates conditions,
//! resolves input, selects and invokes an agent under the resilience stack,
//! and aggregates the final result.

pub mod aggregate;
pub mod condition;
mod dispatch;
mod fanout;
pub mod input;

pub use aggregate::AggregationMode;

use async_trait::async_trait;
use orch_core::cancellation::CancellationFlag;
use orch_core::error::Result;
use orch_core::types::{ExecutionContext, Step, Workflow};
use orch_core::value::Value;
use orch_registry::AgentRegistry;
use orch_resilience::circuit_breaker::CircuitBreakerManager;
use orch_resilience::fallback::FallbackPredicate;
use orch_resilience::retry::RetryPolicy;
use orch_selector::{HealthSource, ScoringWeights, SelectorOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// The invocation surface the composition root wires up over its actual
/// registered `orch_core::Agent` trait objects, mirroring the Selector's
/// `HealthSource` seam so this crate stays free of a dependency on agent
/// implementations.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, agent_id: &str, input: Value) -> Result<Value>;
}

/// Per-step fallback configuration, keyed by step id. The dynamic primary is
/// always whichever agent the Selector picked for that call; only the
/// alternates and predicates are configured ahead of time.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub alternates: Vec<String>,
    pub predicates: Vec<FallbackPredicate>,
}

/// Everything a call to [`execute`] needs beyond the workflow itself.
pub struct ExecutorDeps<'a> {
    pub registry: &'a AgentRegistry,
    pub invoker: &'a dyn AgentInvoker,
    pub health_source: &'a dyn HealthSource,
    pub circuit_breakers: &'a CircuitBreakerManager,
    pub selector_options: SelectorOptions,
    pub scoring_weights: ScoringWeights,
    pub default_retry_policy: RetryPolicy,
    pub retry_overrides: HashMap<String, RetryPolicy>,
    pub fallbacks: HashMap<String, FallbackConfig>,
    pub cancellation: Option<CancellationFlag>,
}

impl<'a> ExecutorDeps<'a> {
    fn retry_policy_for(&self, step_id: &str) -> RetryPolicy {
        self.retry_overrides
            .get(step_id)
            .cloned()
            .unwrap_or_else(|| self.default_retry_policy.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub enable_parallel: bool,
    pub continue_on_error: bool,
    pub aggregation: AggregationMode,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            continue_on_error: false,
            aggregation: AggregationMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Partial,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub value: Value,
    pub errors: Vec<orch_core::types::StepError>,
    pub elapsed: Duration,
}

enum StepOutcome {
    Skipped {
        step_id: String,
    },
    Success {
        step_id: String,
        output_key: Option<String>,
        value: Value,
    },
    Failed {
        step_id: String,
        message: String,
    },
    PartialFanOut {
        step_id: String,
        output_key: Option<String>,
        value: Value,
        message: String,
    },
}

async fn run_step(step: &Step, ctx: &ExecutionContext, deps: &ExecutorDeps<'_>) -> StepOutcome {
    if let Some(condition) = &step.condition {
        if !condition::should_execute(condition, &step.step_id, &ctx.state) {
            return StepOutcome::Skipped {
                step_id: step.step_id.clone(),
            };
        }
    }

    let resolved_input = input::resolve_input(step, ctx);

    if step.fan_out {
        let fan = fanout::run_fan_out(step, resolved_input, deps).await;
        let value = Value::List(fan.items.into_iter().map(|v| v.unwrap_or(Value::Null)).collect());
        if fan.failures.is_empty() {
            StepOutcome::Success {
                step_id: step.step_id.clone(),
                output_key: step.output_key.clone(),
                value,
            }
        } else {
            StepOutcome::PartialFanOut {
                step_id: step.step_id.clone(),
                output_key: step.output_key.clone(),
                value,
                message: fan.failures.join("; "),
            }
        }
    } else {
        match dispatch::dispatch_single(step, resolved_input, deps).await {
            Ok(value) => StepOutcome::Success {
                step_id: step.step_id.clone(),
                output_key: step.output_key.clone(),
                value,
            },
            Err(error) => StepOutcome::Failed {
                step_id: step.step_id.clone(),
                message: error.to_string(),
            },
        }
    }
}

/// Apply a settled outcome to the context; returns whether it counts as a
/// failure for the group-level continue-on-error decision.
fn apply_outcome(ctx: &mut ExecutionContext, outcome: StepOutcome) -> bool {
    match outcome {
        StepOutcome::Skipped { step_id } => {
            ctx.record_skipped(&step_id);
            false
        }
        StepOutcome::Success {
            step_id,
            output_key,
            value,
        } => {
            ctx.record_success(&step_id, output_key.as_deref(), value);
            false
        }
        StepOutcome::Failed { step_id, message } => {
            warn!(step_id, message, "step failed");
            ctx.record_failure(&step_id, message);
            true
        }
        StepOutcome::PartialFanOut {
            step_id,
            output_key,
            value,
            message,
        } => {
            ctx.record_success(&step_id, output_key.as_deref(), value);
            ctx.record_failure(&step_id, message);
            true
        }
    }
}

/// Walk `workflow`'s DAG and produce an aggregated result. See §4.3 for the
/// per-step contract and §4.3.3/§4.3.4 for aggregation and fan-out.
#[instrument(skip(workflow, options, deps), fields(workflow_id = %workflow.id))]
pub async fn execute(
    workflow: &Workflow,
    options: &ExecuteOptions,
    deps: &ExecutorDeps<'_>,
) -> ExecutionResult {
    let start = Instant::now();
    let mut ctx = ExecutionContext::new(workflow.id);
    let mut cancelled = false;
    let mut aborted = false;

    let groups: Vec<Vec<String>> = if options.enable_parallel {
        workflow.parallel_groups.clone()
    } else {
        workflow
            .execution_order
            .iter()
            .map(|id| vec![id.clone()])
            .collect()
    };

    for group in &groups {
        if deps
            .cancellation
            .as_ref()
            .map(CancellationFlag::is_cancelled)
            .unwrap_or(false)
        {
            cancelled = true;
            break;
        }

        // Steps within a group only ever read the context as it stood when
        // the group started — they never observe a sibling's result.
        let snapshot = ctx.clone();
        let outcomes = futures::future::join_all(group.iter().map(|step_id| {
            let step = workflow
                .get_step(step_id)
                .expect("step id in parallel group exists in workflow");
            run_step(step, &snapshot, deps)
        }))
        .await;

        let mut group_failed = false;
        for outcome in outcomes {
            if apply_outcome(&mut ctx, outcome) {
                group_failed = true;
            }
        }

        if group_failed && !options.continue_on_error {
            aborted = true;
            break;
        }
    }

    let elapsed = start.elapsed();
    let status = if cancelled {
        ExecutionStatus::Cancelled
    } else if ctx.has_failures() {
        if options.continue_on_error {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        }
    } else {
        ExecutionStatus::Completed
    };

    let value = aggregate::aggregate(workflow, &ctx, options.aggregation);

    info!(
        workflow_id = %workflow.id,
        status = ?status,
        aborted,
        elapsed_ms = elapsed.as_millis(),
        "execution finished"
    );

    ExecutionResult {
        status,
        value,
        errors: ctx.errors,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::types::{AgentRecord, Task};
    use orch_selector::AlwaysHealthy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoInvoker {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentInvoker for EchoInvoker {
        async fn invoke(&self, _agent_id: &str, input: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(input)
        }
    }

    fn deps<'a>(
        registry: &'a AgentRegistry,
        invoker: &'a dyn AgentInvoker,
        health: &'a dyn HealthSource,
        breakers: &'a CircuitBreakerManager,
    ) -> ExecutorDeps<'a> {
        ExecutorDeps {
            registry,
            invoker,
            health_source: health,
            circuit_breakers: breakers,
            selector_options: SelectorOptions::default(),
            scoring_weights: ScoringWeights::default(),
            default_retry_policy: RetryPolicy::fixed(0, Duration::from_millis(1)),
            retry_overrides: HashMap::new(),
            fallbacks: HashMap::new(),
            cancellation: None,
        }
    }

    #[tokio::test]
    async fn simple_workflow_completes_and_echoes_input() {
        let registry = AgentRegistry::new();
        registry.register(AgentRecord::new("generic_agent", "Generic").with_capabilities(["generic"]));
        let invoker = EchoInvoker {
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let breakers = CircuitBreakerManager::default();
        let deps = deps(&registry, &invoker, &AlwaysHealthy, &breakers);

        let task = Task::new("simple", Value::map());
        let workflow = orch_planner::plan(&task).unwrap();

        let result = execute(&workflow, &ExecuteOptions::default(), &deps).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn research_and_analyze_runs_three_sequential_steps() {
        let registry = AgentRegistry::new();
        for id in ["research_agent", "analysis_agent", "synthesis_agent"] {
            registry.register(AgentRecord::new(id, id).with_capabilities(["generic"]));
        }
        let invoker = EchoInvoker {
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let breakers = CircuitBreakerManager::default();
        let deps = deps(&registry, &invoker, &AlwaysHealthy, &breakers);

        let task = Task::new("research_and_analyze", Value::map());
        let workflow = orch_planner::plan(&task).unwrap();

        let result = execute(&workflow, &ExecuteOptions::default(), &deps).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn missing_agent_fails_the_workflow() {
        let registry = AgentRegistry::new();
        let invoker = EchoInvoker {
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let breakers = CircuitBreakerManager::default();
        let deps = deps(&registry, &invoker, &AlwaysHealthy, &breakers);

        let task = Task::new("simple", Value::map());
        let workflow = orch_planner::plan(&task).unwrap();

        let result = execute(&workflow, &ExecuteOptions::default(), &deps).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn continue_on_error_yields_partial_status() {
        let registry = AgentRegistry::new();
        registry.register(AgentRecord::new("analysis_agent", "A").with_capabilities(["analysis"]));
        let invoker = EchoInvoker {
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let breakers = CircuitBreakerManager::default();
        let deps = deps(&registry, &invoker, &AlwaysHealthy, &breakers);

        // parallel_analysis needs an aggregation_agent for its final step;
        // only analysis_agent is registered, so the aggregate step fails
        // after both analyze_item steps succeed.
        let task = Task::new("parallel_analysis", Value::map());
        let workflow = orch_planner::plan(&task).unwrap();

        let options = ExecuteOptions {
            continue_on_error: true,
            ..ExecuteOptions::default()
        };
        let result = execute(&workflow, &options, &deps).await;
        assert_eq!(result.status, ExecutionStatus::Partial);
    }
}
