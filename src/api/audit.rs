//! Audit log query endpoint.

use super::state::ApiState;
use super::ApiError;
use crate::store::audit::AuditFilter;
use crate::store::{AuditAction, AuditRecord, EntityType};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct AuditQuery {
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    actor: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

pub(super) async fn query_audit(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let entity_type = match query.entity_type.as_deref() {
        None => None,
        Some(raw) => Some(
            EntityType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown entity type {raw:?}")))?,
        ),
    };
    let action = match query.action.as_deref() {
        None => None,
        Some(raw) => Some(
            AuditAction::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown action {raw:?}")))?,
        ),
    };

    let records = state
        .audit
        .query(AuditFilter {
            entity_type,
            entity_id: query.entity_id,
            action,
            actor: query.actor,
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        })
        .await?;

    Ok(Json(records))
}
