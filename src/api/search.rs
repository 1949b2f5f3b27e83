//! Search endpoint.

use super::state::ApiState;
use super::ApiError;
use crate::store::search::{pinned_memories, search_memories, SearchHit};
use crate::UserId;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
    owner: UserId,
    #[serde(default)]
    pinned: Option<bool>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

pub(super) async fn search(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let pinned_only = query.pinned.unwrap_or(false);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    let text = query.q.unwrap_or_default();

    let mut conn = state.pool.acquire().await.map_err(crate::Error::from)?;

    // Empty queries are rejected, except that pinned-only search degrades
    // to a pinned listing in creation order.
    if text.trim().is_empty() {
        if pinned_only {
            let hits = pinned_memories(&mut conn, query.owner, limit, offset).await?;
            return Ok(Json(hits));
        }
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let hits = search_memories(&mut conn, &text, query.owner, pinned_only, limit, offset).await?;
    Ok(Json(hits))
}
