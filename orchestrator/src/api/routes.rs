//! Axum router implementing spec §6's HTTP surface.

use crate::agents::AgentCatalog;
use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{
    CancelResponse, ComponentState, HealthResponse, ListTasksQuery, SubmitTaskRequest,
    SubmitTaskResponse, TaskResponse, TaskResultResponse,
};
use crate::engine::Engine;
use crate::resource_estimator::estimate_task;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration as ChronoDuration;
use orch_core::id::OrchId;
use orch_core::types::TaskStatus;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub agents: AgentCatalog,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(submit_task).get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/result", get(get_task_result))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

fn parse_task_id(raw: &str) -> ApiResult<OrchId> {
    OrchId::parse(raw).map_err(|_| ApiError::BadRequest(format!("invalid task id '{raw}'")))
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitTaskRequest>,
) -> ApiResult<(axum::http::StatusCode, Json<SubmitTaskResponse>)> {
    if request.task_type.is_empty()
        || request.task_type.len() > 100
        || !request
            .task_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::BadRequest(
            "type must be 1-100 characters matching [A-Za-z0-9_-]".to_string(),
        ));
    }

    let estimate = estimate_task(&request.task_type);
    let created_at = chrono::Utc::now();
    let estimated_completion =
        created_at + ChronoDuration::seconds(estimate.estimated_time_seconds as i64);

    let task_id = state
        .engine
        .submit(
            request.task_type,
            request.input,
            request.workflow,
            request.callback_url,
            request.metadata,
        )
        .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(SubmitTaskResponse {
            task_id,
            status: TaskStatus::Pending,
            created_at,
            estimated_completion,
        }),
    ))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let task_id = parse_task_id(&id)?;
    let record = state
        .engine
        .get(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(record.into()))
}

async fn get_task_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskResultResponse>> {
    let task_id = parse_task_id(&id)?;
    let record = state
        .engine
        .get(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;

    if record.task.status != TaskStatus::Completed {
        return Err(ApiError::BadRequest(format!(
            "task {task_id} has status {:?}, result is only available once completed",
            record.task.status
        )));
    }

    Ok(Json(TaskResultResponse {
        task_id,
        status: record.task.status,
        result: record.result.unwrap_or(orch_core::value::Value::Null),
    }))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Json<Vec<TaskResponse>> {
    let records = state.engine.list(query.status, query.offset, query.limit);
    Json(records.into_iter().map(TaskResponse::from).collect())
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let task_id = parse_task_id(&id)?;
    state.engine.cancel(task_id)?;
    let status = state
        .engine
        .get(task_id)
        .map(|r| r.task.status)
        .unwrap_or(TaskStatus::Cancelled);
    Ok(Json(CancelResponse { task_id, status }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut components = HashMap::new();

    let state_store_state = if state.engine.ping_state_store().await {
        ComponentState::Healthy
    } else {
        ComponentState::Unhealthy
    };
    components.insert("state_store".to_string(), state_store_state);

    let agents_state = if state.agents.is_empty() {
        ComponentState::Degraded
    } else {
        ComponentState::Healthy
    };
    components.insert("agents".to_string(), agents_state);

    let overall = if components.values().any(|c| *c == ComponentState::Unhealthy) {
        ComponentState::Unhealthy
    } else if components.values().any(|c| *c == ComponentState::Degraded) {
        ComponentState::Degraded
    } else {
        ComponentState::Healthy
    };

    Json(HealthResponse {
        status: overall,
        components,
    })
}
