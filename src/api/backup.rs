//! Backup status endpoint (read-only).

use super::state::ApiState;
use super::ApiError;
use crate::store::BackupJob;
use crate::UserId;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

pub(super) async fn backup_status(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<BackupJob>, ApiError> {
    let status = state
        .backups
        .latest_for_user(user_id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("no backups for user {user_id}")))?;
    Ok(Json(status))
}
