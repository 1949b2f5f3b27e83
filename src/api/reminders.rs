//! Reminder endpoints.

use super::state::ApiState;
use super::{parse_datetime_field, ApiError};
use crate::store::{CreateReminderInput, Reminder, ReminderFilter, UpdateReminderInput};
use crate::UserId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateReminderRequest {
    owner_user_id: UserId,
    #[serde(default)]
    memory_id: Option<String>,
    text: String,
    fire_at: String,
    #[serde(default)]
    recurrence_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub(super) struct UpdateReminderRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    fire_at: Option<String>,
    #[serde(default)]
    recurrence_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub(super) struct ReminderListQuery {
    #[serde(default)]
    owner_user_id: Option<UserId>,
    #[serde(default)]
    fired: Option<bool>,
    #[serde(default)]
    upcoming_only: Option<bool>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

pub(super) async fn create_reminder(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<Reminder>), ApiError> {
    let fire_at = parse_datetime_field(&request.fire_at, "fire_at")?;

    let reminder = state
        .reminders
        .create(CreateReminderInput {
            owner_user_id: request.owner_user_id,
            memory_id: request.memory_id,
            text: request.text,
            fire_at,
            recurrence_minutes: request.recurrence_minutes,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reminder)))
}

pub(super) async fn list_reminders(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ReminderListQuery>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let reminders = state
        .reminders
        .list(ReminderFilter {
            owner_user_id: query.owner_user_id,
            fired: query.fired,
            upcoming_only: query.upcoming_only.unwrap_or(false),
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        })
        .await?;

    Ok(Json(reminders))
}

pub(super) async fn update_reminder(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateReminderRequest>,
) -> Result<Json<Reminder>, ApiError> {
    let fire_at = request
        .fire_at
        .as_deref()
        .map(|raw| parse_datetime_field(raw, "fire_at"))
        .transpose()?;

    let reminder = state
        .reminders
        .update(
            &id,
            UpdateReminderInput {
                text: request.text,
                fire_at,
                recurrence_minutes: request.recurrence_minutes,
            },
        )
        .await?;

    Ok(Json(reminder))
}

pub(super) async fn delete_reminder(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.reminders.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
