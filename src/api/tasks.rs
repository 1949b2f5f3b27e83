//! Task endpoints.

use super::state::ApiState;
use super::{parse_datetime_field, ApiError};
use crate::store::{CreateTaskInput, Task, TaskState, TaskUpdateOutcome, UpdateTaskInput};
use crate::UserId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateTaskRequest {
    owner_user_id: UserId,
    #[serde(default)]
    memory_id: Option<String>,
    description: String,
    #[serde(default)]
    due_at: Option<String>,
    #[serde(default)]
    recurrence_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub(super) struct UpdateTaskRequest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    due_at: Option<String>,
    #[serde(default)]
    recurrence_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub(super) struct TaskListQuery {
    owner_user_id: UserId,
    #[serde(default)]
    state: Option<String>,
}

pub(super) async fn create_task(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let due_at = request
        .due_at
        .as_deref()
        .map(|raw| parse_datetime_field(raw, "due_at"))
        .transpose()?;

    let task = state
        .tasks
        .create(CreateTaskInput {
            owner_user_id: request.owner_user_id,
            memory_id: request.memory_id,
            description: request.description,
            due_at,
            recurrence_minutes: request.recurrence_minutes,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn list_tasks(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let task_state = match query.state.as_deref() {
        None => None,
        Some(raw) => Some(
            TaskState::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown task state {raw:?}")))?,
        ),
    };

    let tasks = state.tasks.list(query.owner_user_id, task_state).await?;
    Ok(Json(tasks))
}

pub(super) async fn update_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<TaskUpdateOutcome>, ApiError> {
    let task_state = match request.state.as_deref() {
        None => None,
        Some(raw) => Some(
            TaskState::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown task state {raw:?}")))?,
        ),
    };
    let due_at = request
        .due_at
        .as_deref()
        .map(|raw| parse_datetime_field(raw, "due_at"))
        .transpose()?;

    let outcome = state
        .tasks
        .update(
            &id,
            UpdateTaskInput {
                description: request.description,
                state: task_state,
                due_at,
                recurrence_minutes: request.recurrence_minutes,
            },
        )
        .await?;

    Ok(Json(outcome))
}

pub(super) async fn delete_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.tasks.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
