//! Request/response shapes for the task submission API (spec §6).

use crate::engine::TaskRecord;
use chrono::{DateTime, Utc};
use orch_core::id::OrchId;
use orch_core::types::TaskStatus;
use orch_core::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default = "Value::map")]
    pub input: Value,
    pub workflow: Option<String>,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: OrchId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: OrchId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: TaskStatus,
    pub input: Value,
    pub workflow_id: Option<OrchId>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.task.id,
            task_type: record.task.task_type,
            status: record.task.status,
            input: record.task.input,
            workflow_id: record.workflow_id,
            error: record.error,
            created_at: record.task.created_at,
            updated_at: record.task.updated_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResultResponse {
    pub task_id: OrchId,
    pub status: TaskStatus,
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: OrchId,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: ComponentState,
    pub components: HashMap<String, ComponentState>,
}
