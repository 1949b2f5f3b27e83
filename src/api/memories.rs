//! Memory endpoints, including tag attachment.

use super::state::ApiState;
use super::ApiError;
use crate::store::{
    remove_media_blob, CreateMemoryInput, MediaType, MemoryStatus, MemoryTag, MemoryWithTags,
    TagStatus, UpdateMemoryInput,
};
use crate::UserId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateMemoryRequest {
    owner_user_id: UserId,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    media_file_id: Option<String>,
    #[serde(default)]
    source_chat_id: Option<i64>,
    #[serde(default)]
    source_message_id: Option<i64>,
}

#[derive(Deserialize)]
pub(super) struct UpdateMemoryRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    is_pinned: Option<bool>,
    #[serde(default)]
    media_local_path: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct AddTagsRequest {
    tags: Vec<String>,
    #[serde(default = "default_tag_status")]
    status: String,
}

fn default_tag_status() -> String {
    "confirmed".into()
}

pub(super) async fn create_memory(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateMemoryRequest>,
) -> Result<(StatusCode, Json<MemoryWithTags>), ApiError> {
    let media_type = match request.media_type.as_deref() {
        None => None,
        Some(raw) => Some(
            MediaType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown media type {raw:?}")))?,
        ),
    };

    let memory = state
        .memories
        .create(CreateMemoryInput {
            owner_user_id: request.owner_user_id,
            content: request.content,
            media_type,
            media_file_id: request.media_file_id,
            source_chat_id: request.source_chat_id,
            source_message_id: request.source_message_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MemoryWithTags {
            memory,
            tags: Vec::new(),
        }),
    ))
}

pub(super) async fn get_memory(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<MemoryWithTags>, ApiError> {
    let memory = state
        .memories
        .get(&id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("memory {id}")))?;
    Ok(Json(memory))
}

pub(super) async fn update_memory(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemoryRequest>,
) -> Result<Json<MemoryWithTags>, ApiError> {
    let status = match request.status.as_deref() {
        None => None,
        Some(raw) => Some(
            MemoryStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown memory status {raw:?}")))?,
        ),
    };

    state
        .memories
        .update(
            &id,
            UpdateMemoryInput {
                content: request.content,
                status,
                is_pinned: request.is_pinned,
                media_local_path: request.media_local_path,
            },
        )
        .await?;

    let memory = state
        .memories
        .get(&id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("memory {id}")))?;
    Ok(Json(memory))
}

pub(super) async fn delete_memory(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.memories.delete(&id).await?;

    if let Some(path) = deleted.media_local_path.as_deref() {
        remove_media_blob(path);
    }

    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn add_tags(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<AddTagsRequest>,
) -> Result<(StatusCode, Json<Vec<MemoryTag>>), ApiError> {
    let status = TagStatus::parse(&request.status)
        .ok_or_else(|| ApiError::bad_request(format!("unknown tag status {:?}", request.status)))?;

    let owner = state
        .memories
        .get_memory(&id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("memory {id}")))?
        .owner_user_id;
    let actor = match status {
        TagStatus::Confirmed => format!("user:{owner}"),
        TagStatus::Suggested => "system:llm_worker".to_string(),
    };

    let tags = state.tags.add_tags(&id, &request.tags, status, &actor).await?;
    Ok((StatusCode::CREATED, Json(tags)))
}

pub(super) async fn delete_tag(
    State(state): State<Arc<ApiState>>,
    Path((id, tag)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let owner = state
        .memories
        .get_memory(&id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("memory {id}")))?
        .owner_user_id;

    state.tags.delete_tag(&id, &tag, &format!("user:{owner}")).await?;
    Ok(StatusCode::NO_CONTENT)
}
