//! Task lifecycle engine: submission, FIFO worker pool, and the
//! pending -> planning -> planning_complete -> executing ->
//! completed|failed|cancelled transitions (spec `engine.py`, §5).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use orch_core::config::OrchestratorConfig;
use orch_core::error::{OrchError, Result};
use orch_core::id::OrchId;
use orch_core::types::{Task, TaskStatus};
use orch_core::value::{Map, Value};
use orch_core::CancellationFlag;
use orch_core::traits::StateStore;
use orch_executor::{AgentInvoker, ExecuteOptions, ExecutionStatus, ExecutorDeps};
use orch_registry::AgentRegistry;
use orch_resilience::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager};
use orch_resilience::retry::RetryPolicy;
use orch_selector::{HealthSource, ScoringWeights, SelectorOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, instrument, warn};

/// A submitted task plus the bookkeeping the Engine accumulates as it
/// drives the task through planning and execution. `task.status` is the
/// single source of truth for the task's lifecycle state.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task: Task,
    pub workflow_id: Option<OrchId>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

struct EngineInner {
    registry: AgentRegistry,
    state_store: Arc<dyn StateStore>,
    invoker: Arc<dyn AgentInvoker>,
    health_source: Arc<dyn HealthSource>,
    circuit_breakers: CircuitBreakerManager,
    config: OrchestratorConfig,
    tasks: DashMap<OrchId, TaskRecord>,
    cancellations: DashMap<OrchId, CancellationFlag>,
    queue_tx: mpsc::Sender<OrchId>,
}

/// Process-wide, cheaply cloned (an `Arc` around its shared state) per §5
/// "Shared resources".
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        config: OrchestratorConfig,
        registry: AgentRegistry,
        state_store: Arc<dyn StateStore>,
        invoker: Arc<dyn AgentInvoker>,
        health_source: Arc<dyn HealthSource>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.server.queue_capacity);
        let breaker_config = CircuitBreakerConfig {
            failure_threshold: config.resilience.circuit_failure_threshold,
            half_open_max: config.resilience.circuit_half_open_max,
            success_threshold: config.resilience.circuit_success_threshold,
            timeout: Duration::from_secs(config.resilience.circuit_timeout_secs),
        };
        let worker_count = config.server.worker_count.max(1);

        let inner = Arc::new(EngineInner {
            registry,
            state_store,
            invoker,
            health_source,
            circuit_breakers: CircuitBreakerManager::new(breaker_config),
            config,
            tasks: DashMap::new(),
            cancellations: DashMap::new(),
            queue_tx,
        });
        let engine = Self { inner };

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        for worker_id in 0..worker_count {
            let engine = engine.clone();
            let queue_rx = queue_rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = queue_rx.lock().await.recv().await;
                    match next {
                        Some(task_id) => {
                            if let Err(err) = engine.run_task(task_id).await {
                                error!(worker_id, %task_id, error = %err, "task run failed");
                            }
                        }
                        None => break,
                    }
                }
            });
        }

        engine
    }

    /// Queue a task for FIFO execution by the worker pool and return
    /// immediately with its id (the `POST /tasks` contract, §6).
    pub async fn submit(
        &self,
        task_type: impl Into<String>,
        input: Value,
        workflow_name: Option<String>,
        callback_url: Option<String>,
        metadata: HashMap<String, String>,
    ) -> OrchId {
        let mut task = Task::new(task_type, input);
        task.workflow_name = workflow_name;
        task.callback_url = callback_url;
        task.metadata = metadata;
        let task_id = task.id;

        self.inner.tasks.insert(
            task_id,
            TaskRecord {
                task,
                workflow_id: None,
                result: None,
                error: None,
                completed_at: None,
            },
        );
        self.inner
            .cancellations
            .insert(task_id, CancellationFlag::new());

        info!(%task_id, "task queued");
        // The channel is sized to the configured queue capacity; a full
        // queue means the caller should back off, so this never drops work
        // silently by swallowing a `try_send` failure.
        if self.inner.queue_tx.send(task_id).await.is_err() {
            warn!(%task_id, "worker pool channel closed, task will not run");
        }
        task_id
    }

    /// Run a task to completion directly, bypassing the FIFO queue — the
    /// synchronous counterpart `submit` to used by workflow chaining, where
    /// each step must finish before the next begins.
    pub async fn execute_now(
        &self,
        task_type: impl Into<String>,
        input: Value,
        workflow_name: Option<String>,
    ) -> Result<TaskRecord> {
        let mut task = Task::new(task_type, input);
        task.workflow_name = workflow_name;
        let task_id = task.id;

        self.inner.tasks.insert(
            task_id,
            TaskRecord {
                task,
                workflow_id: None,
                result: None,
                error: None,
                completed_at: None,
            },
        );
        self.inner
            .cancellations
            .insert(task_id, CancellationFlag::new());

        self.run_task(task_id).await?;

        self.get(task_id)
            .ok_or_else(|| OrchError::NotFound(format!("task {task_id}")))
    }

    /// Used by `GET /health`: a cheap round-trip that exercises the state
    /// store's connectivity without touching any particular workflow.
    pub async fn ping_state_store(&self) -> bool {
        self.inner.state_store.list().await.is_ok()
    }

    pub fn get(&self, task_id: OrchId) -> Option<TaskRecord> {
        self.inner.tasks.get(&task_id).map(|r| r.clone())
    }

    /// Newest-first, optionally filtered by status, with `offset`/`limit`
    /// applied after sorting (the `GET /tasks` contract, §6).
    pub fn list(&self, status: Option<TaskStatus>, offset: usize, limit: usize) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .inner
            .tasks
            .iter()
            .map(|r| r.clone())
            .filter(|r| status.map(|s| r.task.status == s).unwrap_or(true))
            .collect();
        records.sort_by(|a, b| b.task.created_at.cmp(&a.task.created_at));
        records.into_iter().skip(offset).take(limit).collect()
    }

    /// Request cancellation. Rejected once the task has already reached a
    /// terminal settled state (§6: "rejects with 400 if status is
    /// completed/failed").
    pub fn cancel(&self, task_id: OrchId) -> Result<()> {
        let record = self
            .inner
            .tasks
            .get(&task_id)
            .ok_or_else(|| OrchError::NotFound(format!("task {task_id}")))?;

        if matches!(record.task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(OrchError::Validation(format!(
                "task {task_id} has already reached a terminal status and cannot be cancelled"
            )));
        }
        drop(record);

        if let Some(flag) = self.inner.cancellations.get(&task_id) {
            flag.cancel();
            info!(%task_id, "cancellation requested");
        }
        Ok(())
    }

    fn default_retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        policy.max_retries = self.inner.config.resilience.default_max_retries;
        policy
    }

    fn mutate<F: FnOnce(&mut TaskRecord)>(&self, task_id: OrchId, f: F) {
        if let Some(mut record) = self.inner.tasks.get_mut(&task_id) {
            f(&mut record);
            record.task.updated_at = Utc::now();
        }
    }

    #[instrument(skip(self), fields(%task_id))]
    async fn run_task(&self, task_id: OrchId) -> Result<()> {
        self.mutate(task_id, |r| r.task.status = TaskStatus::Planning);

        let task_snapshot = self
            .inner
            .tasks
            .get(&task_id)
            .map(|r| r.task.clone())
            .ok_or_else(|| OrchError::NotFound(format!("task {task_id}")))?;

        let workflow = match orch_planner::plan(&task_snapshot) {
            Ok(workflow) => workflow,
            Err(err) => {
                warn!(%task_id, error = %err, "planning failed");
                self.mutate(task_id, |r| {
                    r.task.status = TaskStatus::Failed;
                    r.error = Some(err.to_string());
                    r.completed_at = Some(Utc::now());
                });
                return Ok(());
            }
        };

        self.mutate(task_id, |r| {
            r.workflow_id = Some(workflow.id);
            r.task.status = TaskStatus::PlanningComplete;
        });

        info!(%task_id, workflow_id = %workflow.id, steps = workflow.len(), "workflow planned");

        let mut planning_state = Map::new();
        planning_state.insert("task_id".to_string(), Value::String(task_id.to_string()));
        planning_state.insert(
            "status".to_string(),
            Value::String("planning_complete".to_string()),
        );
        if let Err(err) = self
            .inner
            .state_store
            .save(&workflow.id.to_string(), planning_state, None)
            .await
        {
            warn!(%task_id, error = %err, "failed to persist planning_complete state");
        }

        self.mutate(task_id, |r| r.task.status = TaskStatus::Executing);

        let cancellation = self.inner.cancellations.get(&task_id).map(|c| c.clone());

        let deps = ExecutorDeps {
            registry: &self.inner.registry,
            invoker: self.inner.invoker.as_ref(),
            health_source: self.inner.health_source.as_ref(),
            circuit_breakers: &self.inner.circuit_breakers,
            selector_options: SelectorOptions::default(),
            scoring_weights: ScoringWeights::default(),
            default_retry_policy: self.default_retry_policy(),
            retry_overrides: HashMap::new(),
            fallbacks: HashMap::new(),
            cancellation,
        };

        let execution = orch_executor::execute(&workflow, &ExecuteOptions::default(), &deps).await;

        let status_label = match execution.status {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        let mut final_state = Map::new();
        final_state.insert("task_id".to_string(), Value::String(task_id.to_string()));
        final_state.insert("status".to_string(), Value::String(status_label.to_string()));
        if let Err(err) = self
            .inner
            .state_store
            .save(&workflow.id.to_string(), final_state, None)
            .await
        {
            warn!(%task_id, error = %err, "failed to persist final state");
        }

        match execution.status {
            ExecutionStatus::Completed | ExecutionStatus::Partial => {
                self.mutate(task_id, |r| {
                    r.task.status = TaskStatus::Completed;
                    r.result = Some(execution.value.clone());
                    r.completed_at = Some(Utc::now());
                });
            }
            ExecutionStatus::Cancelled => {
                self.mutate(task_id, |r| {
                    r.task.status = TaskStatus::Cancelled;
                    r.completed_at = Some(Utc::now());
                });
            }
            ExecutionStatus::Failed => {
                let message = execution
                    .errors
                    .last()
                    .map(|e| format!("step '{}': {}", e.step_id, e.message))
                    .unwrap_or_else(|| "execution failed".to_string());
                self.mutate(task_id, |r| {
                    r.task.status = TaskStatus::Failed;
                    r.error = Some(message.clone());
                    r.completed_at = Some(Utc::now());
                });
            }
        }

        self.inner.cancellations.remove(&task_id);
        info!(%task_id, status = status_label, "task finished");
        Ok(())
    }
}
