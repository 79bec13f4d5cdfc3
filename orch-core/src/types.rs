//! Core domain types shared across the orchestrator crates.
//!
//! These are plain data: construction and mutation happen through the
//! components that own them (Engine owns `Task` transitions, Planner builds
//! `Workflow`s and never mutates them afterwards, Executor owns an
//! `ExecutionContext` for one run). See each struct's doc comment for its
//! ownership boundary.

use crate::id::OrchId;
use crate::value::{Map, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Planning,
    PlanningComplete,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

/// Externally-submitted unit of work. Created by the Engine on submission,
/// updated only by the Engine as it drives the task through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: OrchId,
    pub task_type: String,
    pub input: Value,
    pub workflow_name: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: HashMap<String, String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, input: Value) -> Self {
        let now = Utc::now();
        Self {
            id: OrchId::new(),
            task_type: task_type.into(),
            input,
            workflow_name: None,
            callback_url: None,
            metadata: HashMap::new(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------
// Conditions (§4.3.1)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    NotContains,
    Exists,
    NotExists,
    In,
    NotIn,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleCondition {
    pub field: String,
    pub op: ConditionOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchClause {
    pub condition: Box<Condition>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElseClause {
    pub steps: Vec<String>,
}

/// Tagged variants dispatched on by the executor's condition evaluator, per
/// Design Notes "Conditional expressions".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Simple(SimpleCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Branch {
        branches: Vec<BranchClause>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        r#else: Option<ElseClause>,
    },
}

// ---------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// One node in a workflow DAG. Declared by the Planner and never mutated
/// afterwards — runtime status and results for a particular execution live
/// in that execution's `ExecutionContext`, not here, so that a `Workflow`
/// can be safely shared/replayed across runs without interior mutability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub agent_type: String,
    pub input: Value,
    #[serde(default)]
    pub capabilities_required: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub fan_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

impl Step {
    pub fn new(step_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            agent_type: agent_type.into(),
            input: Value::map(),
            capabilities_required: Vec::new(),
            depends_on: Vec::new(),
            output_key: None,
            condition: None,
            fan_out: false,
            estimated_time: None,
            estimated_cost: None,
        }
    }
}

// ---------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------

/// Compiled form of a `Task`. Steps are kept in insertion order (the order
/// the Planner expanded the template in); `execution_order` and
/// `parallel_groups` are precomputed once by the Planner and never
/// recalculated, per the "not mutated after planning completes" invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: OrchId,
    pub name: String,
    pub task_type: String,
    steps: Vec<Step>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    pub execution_order: Vec<String>,
    pub parallel_groups: Vec<Vec<String>>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, task_type: impl Into<String>, steps: Vec<Step>) -> Self {
        let index = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_id.clone(), i))
            .collect();
        Self {
            id: OrchId::new(),
            name: name.into(),
            task_type: task_type.into(),
            steps,
            index,
            execution_order: Vec::new(),
            parallel_groups: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get_step(&self, step_id: &str) -> Option<&Step> {
        self.index.get(step_id).map(|&i| &self.steps[i])
    }

    pub fn contains_step(&self, step_id: &str) -> bool {
        self.index.contains_key(step_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// After deserialization the index must be rebuilt since it's `#[serde(skip)]`.
impl Workflow {
    pub fn rebuild_index(&mut self) {
        self.index = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.step_id.clone(), i))
            .collect();
    }
}

// ---------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    pub step_id: String,
    pub message: String,
}

/// Transient per-execution record. Owned exclusively by the Executor for the
/// duration of one workflow run, then flushed to the state store and
/// discarded — see the concurrency model's single-writer rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: OrchId,
    pub step_results: HashMap<String, Value>,
    pub step_status: HashMap<String, StepStatus>,
    pub errors: Vec<StepError>,
    pub state: Map,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(workflow_id: OrchId) -> Self {
        Self {
            workflow_id,
            step_results: HashMap::new(),
            step_status: HashMap::new(),
            errors: Vec::new(),
            state: Map::new(),
            started_at: Utc::now(),
        }
    }

    /// Record a successful step result, exporting it under `output_key` into
    /// the workflow state map if one was declared.
    pub fn record_success(&mut self, step_id: &str, output_key: Option<&str>, result: Value) {
        if let Some(key) = output_key {
            self.state.insert(key.to_string(), result.clone());
        }
        self.step_results.insert(step_id.to_string(), result);
        self.step_status
            .insert(step_id.to_string(), StepStatus::Completed);
    }

    pub fn record_failure(&mut self, step_id: &str, message: impl Into<String>) {
        self.errors.push(StepError {
            step_id: step_id.to_string(),
            message: message.into(),
        });
        self.step_status
            .insert(step_id.to_string(), StepStatus::Failed);
    }

    pub fn record_skipped(&mut self, step_id: &str) {
        self.step_status
            .insert(step_id.to_string(), StepStatus::Skipped);
    }

    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------
// Agent registry record
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub cost_per_call: f64,
    pub max_concurrency: u32,
    pub metadata: HashMap<String, String>,
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            capabilities: Vec::new(),
            status: AgentStatus::Active,
            cost_per_call: 0.0,
            max_concurrency: 1,
            metadata: HashMap::new(),
            last_heartbeat: Utc::now(),
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.capabilities.iter().any(|c| c == cap)
    }
}

// ---------------------------------------------------------------------
// State store versions & checkpoints
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVersion {
    pub workflow_id: String,
    pub version: u64,
    pub state: Map,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub workflow_id: String,
    pub version: u64,
    pub state: Map,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Message envelope (collaborator concern — orchestrator only builds/parses)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Task,
    Response,
    Status,
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: OrchId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<OrchId>,
}

impl Message {
    pub fn new_task(from: impl Into<String>, to: impl Into<String>, payload: Value) -> Self {
        Self {
            message_id: OrchId::new(),
            message_type: MessageType::Task,
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
            payload,
            correlation_id: None,
        }
    }

    /// Build the `response` message for a prior `task` message, carrying its
    /// `message_id` forward as `correlation_id` per the envelope contract.
    pub fn new_response(request: &Message, from: impl Into<String>, payload: Value) -> Self {
        Self {
            message_id: OrchId::new(),
            message_type: MessageType::Response,
            from: from.into(),
            to: request.from.clone(),
            timestamp: Utc::now(),
            payload,
            correlation_id: Some(request.message_id),
        }
    }

    pub const BROADCAST: &'static str = "broadcast";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_lookup_by_step_id() {
        let wf = Workflow::new(
            "simple",
            "simple",
            vec![Step::new("execute", "generic_agent")],
        );
        assert!(wf.get_step("execute").is_some());
        assert!(wf.get_step("missing").is_none());
    }

    #[test]
    fn message_response_carries_correlation_id() {
        let task = Message::new_task("engine", "echo_agent", Value::map());
        let response = Message::new_response(&task, "echo_agent", Value::map());
        assert_eq!(response.correlation_id, Some(task.message_id));
        assert_eq!(response.to, "engine");
    }
}
