//! Per-user settings endpoints.

use super::state::ApiState;
use super::ApiError;
use crate::store::UserSettings;
use crate::UserId;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct UpdateSettingsRequest {
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

pub(super) async fn get_settings(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserSettings>, ApiError> {
    let settings = state
        .settings
        .get(user_id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("settings for user {user_id}")))?;
    Ok(Json(settings))
}

pub(super) async fn put_settings(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<UserId>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<UserSettings>, ApiError> {
    if let Some(timezone) = request.timezone.as_deref() {
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ApiError::bad_request(format!("unknown timezone {timezone:?}")));
        }
    }

    let settings = state
        .settings
        .upsert(user_id, request.timezone, request.language)
        .await?;
    Ok(Json(settings))
}
