//! LLM job endpoints.
//!
//! Creating a job persists the row, then publishes the stream message the
//! worker consumes. The publish happens after the row commits so a worker
//! can always PATCH the job it was handed.

use super::state::ApiState;
use super::ApiError;
use crate::store::llm_jobs::LlmJobFilter;
use crate::store::{CreateLlmJobInput, JobStatus, JobType, LlmJob, UpdateLlmJobInput};
use crate::streams::{stream_for_job_type, JobMessage};
use crate::UserId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateJobRequest {
    job_type: String,
    payload: serde_json::Value,
    #[serde(default)]
    user_id: Option<UserId>,
}

#[derive(Deserialize)]
pub(super) struct UpdateJobRequest {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct JobListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    job_type: Option<String>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

pub(super) async fn create_job(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<LlmJob>), ApiError> {
    let job_type = JobType::parse(&request.job_type)
        .ok_or_else(|| ApiError::bad_request(format!("unknown job type {:?}", request.job_type)))?;

    let job = state
        .llm_jobs
        .create(CreateLlmJobInput {
            job_type,
            payload: request.payload,
            user_id: request.user_id,
        })
        .await?;

    match &state.broker {
        Some(broker) => {
            let message = JobMessage {
                job_id: job.id.clone(),
                job_type: job_type.as_str().to_string(),
                payload: job.payload.clone(),
                user_id: job.user_id,
            };
            if let Err(error) = broker.publish(stream_for_job_type(job_type), &message).await {
                // The row is queued; a worker can still pick it up once
                // the message is re-published or the job re-created.
                tracing::error!(job_id = %job.id, %error, "failed to publish job message");
            }
        }
        None => {
            tracing::warn!(job_id = %job.id, "no broker configured, job not published");
        }
    }

    Ok((StatusCode::CREATED, Json(job)))
}

pub(super) async fn get_job(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<LlmJob>, ApiError> {
    let job = state
        .llm_jobs
        .get(&id)
        .await?
        .ok_or_else(|| crate::Error::not_found(format!("llm job {id}")))?;
    Ok(Json(job))
}

pub(super) async fn update_job(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateJobRequest>,
) -> Result<Json<LlmJob>, ApiError> {
    let status = match request.status.as_deref() {
        None => None,
        Some(raw) => Some(
            JobStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown job status {raw:?}")))?,
        ),
    };

    let job = state
        .llm_jobs
        .update(
            &id,
            UpdateLlmJobInput {
                status,
                result: request.result,
                error_message: request.error_message,
            },
        )
        .await?;

    Ok(Json(job))
}

pub(super) async fn list_jobs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<LlmJob>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            JobStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown job status {raw:?}")))?,
        ),
    };
    let job_type = match query.job_type.as_deref() {
        None => None,
        Some(raw) => Some(
            JobType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown job type {raw:?}")))?,
        ),
    };

    let jobs = state
        .llm_jobs
        .list(LlmJobFilter {
            status,
            job_type,
            user_id: query.user_id,
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        })
        .await?;

    Ok(Json(jobs))
}
