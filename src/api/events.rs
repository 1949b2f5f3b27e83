//! Event endpoints.

use super::state::ApiState;
use super::{parse_datetime_field, ApiError};
use crate::store::{CreateEventInput, Event, EventSourceType, EventStatus, UpdateEventInput};
use crate::UserId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateEventRequest {
    owner_user_id: UserId,
    description: String,
    event_time: String,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    source_detail: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct UpdateEventRequest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct EventListQuery {
    #[serde(default)]
    owner_user_id: Option<UserId>,
    #[serde(default)]
    status: Option<String>,
}

pub(super) async fn create_event(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event_time = parse_datetime_field(&request.event_time, "event_time")?;
    let source_type = match request.source_type.as_deref() {
        None => EventSourceType::Manual,
        Some(raw) => EventSourceType::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown source type {raw:?}")))?,
    };

    let event = state
        .events
        .create(CreateEventInput {
            owner_user_id: request.owner_user_id,
            description: request.description,
            event_time,
            source_type,
            source_detail: request.source_detail,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

pub(super) async fn list_events(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            EventStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown event status {raw:?}")))?,
        ),
    };

    let events = state.events.list(query.owner_user_id, status).await?;
    Ok(Json(events))
}

pub(super) async fn update_event(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<Event>, ApiError> {
    let status = match request.status.as_deref() {
        None => None,
        Some(raw) => Some(
            EventStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown event status {raw:?}")))?,
        ),
    };
    let event_time = request
        .event_time
        .as_deref()
        .map(|raw| parse_datetime_field(raw, "event_time"))
        .transpose()?;

    let event = state
        .events
        .update(
            &id,
            UpdateEventInput {
                description: request.description,
                event_time,
                status,
            },
        )
        .await?;

    Ok(Json(event))
}
