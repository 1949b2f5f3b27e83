//! LLM job storage (SQLite).
//!
//! A job is terminal in `completed` or `failed`. The worker consults the
//! stored status before invoking the model, so redelivery of a stream
//! message for a terminal job never calls the model again.

use crate::db::{now_utc_string, parse_db_datetime};
use crate::error::{DbError, Error, Result};
use crate::store::{log_audit, AuditAction, EntityType, JobStatus, JobType};
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct LlmJob {
    pub id: String,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub user_id: Option<UserId>,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateLlmJobInput {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLlmJobInput {
    pub status: Option<JobStatus>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Filters for the job listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct LlmJobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub user_id: Option<UserId>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct LlmJobStore {
    pool: SqlitePool,
}

impl LlmJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateLlmJobInput) -> Result<LlmJob> {
        let job_id = crate::new_entity_id();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO llm_jobs (id, job_type, payload, user_id, status) VALUES (?, ?, ?, ?, 'queued')",
        )
        .bind(&job_id)
        .bind(input.job_type.as_str())
        .bind(input.payload.to_string())
        .bind(input.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("llm job insert: {e}")))?;

        let actor = match input.user_id {
            Some(user_id) => format!("user:{user_id}"),
            None => "system:api".to_string(),
        };
        log_audit(
            &mut *tx,
            EntityType::LlmJob,
            &job_id,
            AuditAction::Created,
            &actor,
            None,
        )
        .await?;

        tx.commit().await?;

        self.get(&job_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("llm job {job_id}")))
    }

    pub async fn get(&self, id: &str) -> Result<Option<LlmJob>> {
        let row = sqlx::query("SELECT * FROM llm_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("llm job fetch: {e}")))?;

        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn update(&self, id: &str, input: UpdateLlmJobInput) -> Result<LlmJob> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM llm_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("llm job fetch: {e}")))?;
        if exists.is_none() {
            return Err(Error::not_found(format!("llm job {id}")));
        }

        let mut fields: Vec<&str> = Vec::new();
        if input.status.is_some() {
            fields.push("status = ?");
        }
        if input.result.is_some() {
            fields.push("result = ?");
        }
        if input.error_message.is_some() {
            fields.push("error_message = ?");
        }
        fields.push("updated_at = ?");

        let sql = format!("UPDATE llm_jobs SET {} WHERE id = ?", fields.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(status) = input.status {
            query = query.bind(status.as_str());
        }
        if let Some(result) = &input.result {
            query = query.bind(result.to_string());
        }
        if let Some(error_message) = &input.error_message {
            query = query.bind(error_message);
        }
        query = query.bind(now_utc_string()).bind(id);

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("llm job update: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::LlmJob,
            id,
            AuditAction::Updated,
            "system:llm_worker",
            input.status.map(|s| serde_json::json!({"status": s.as_str()})),
        )
        .await?;

        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("llm job {id}")))
    }

    pub async fn list(&self, filter: LlmJobFilter) -> Result<Vec<LlmJob>> {
        let mut sql = String::from("SELECT * FROM llm_jobs");
        let mut clauses: Vec<&str> = Vec::new();

        if filter.status.is_some() {
            clauses.push("status = ?");
        }
        if filter.job_type.is_some() {
            clauses.push("job_type = ?");
        }
        if filter.user_id.is_some() {
            clauses.push("user_id = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(job_type) = filter.job_type {
            query = query.bind(job_type.as_str());
        }
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        let limit = if filter.limit > 0 { filter.limit.min(500) } else { 50 };
        query = query.bind(limit).bind(filter.offset.max(0));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("llm job list: {e}")))?;

        rows.iter().map(job_from_row).collect()
    }
}

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LlmJob> {
    let job_type_raw: String = row.try_get("job_type")?;
    let status_raw: String = row.try_get("status")?;
    let payload_raw: String = row.try_get("payload")?;
    let result_raw: Option<String> = row.try_get("result")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(LlmJob {
        id: row.try_get("id")?,
        job_type: JobType::parse(&job_type_raw)
            .ok_or_else(|| DbError::Query(format!("unknown job type {job_type_raw:?}")))?,
        payload: serde_json::from_str(&payload_raw)
            .map_err(|e| DbError::Query(format!("bad job payload: {e}")))?,
        user_id: row.try_get("user_id")?,
        status: JobStatus::parse(&status_raw)
            .ok_or_else(|| DbError::Query(format!("unknown job status {status_raw:?}")))?,
        result: result_raw.and_then(|r| serde_json::from_str(&r).ok()),
        error_message: row.try_get("error_message")?,
        created_at: parse_db_datetime(&created_raw)
            .ok_or_else(|| DbError::Query(format!("bad created_at {created_raw:?}")))?,
        updated_at: parse_db_datetime(&updated_raw)
            .ok_or_else(|| DbError::Query(format!("bad updated_at {updated_raw:?}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_lifecycle_to_completed() {
        let pool = test_pool().await;
        let store = LlmJobStore::new(pool);

        let job = store
            .create(CreateLlmJobInput {
                job_type: JobType::ImageTag,
                payload: serde_json::json!({"memory_id": "m1", "image_path": "/tmp/x.jpg"}),
                user_id: Some(12),
            })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.result.is_none());

        let done = store
            .update(
                &job.id,
                UpdateLlmJobInput {
                    status: Some(JobStatus::Completed),
                    result: Some(serde_json::json!({"tags": ["cat"]})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.status.is_terminal());
        assert_eq!(done.result.unwrap()["tags"][0], "cat");
        assert!(done.updated_at >= job.updated_at);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let pool = test_pool().await;
        let store = LlmJobStore::new(pool);

        store
            .create(CreateLlmJobInput {
                job_type: JobType::Followup,
                payload: serde_json::json!({"message": "hi"}),
                user_id: Some(1),
            })
            .await
            .unwrap();
        let other = store
            .create(CreateLlmJobInput {
                job_type: JobType::TaskMatch,
                payload: serde_json::json!({}),
                user_id: Some(2),
            })
            .await
            .unwrap();
        store
            .update(
                &other.id,
                UpdateLlmJobInput {
                    status: Some(JobStatus::Failed),
                    error_message: Some("boom".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let failed = store
            .list(LlmJobFilter {
                status: Some(JobStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("boom"));

        let for_user = store
            .list(LlmJobFilter {
                user_id: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(for_user.len(), 1);
        assert_eq!(for_user[0].job_type, JobType::Followup);
    }

    #[tokio::test]
    async fn test_update_missing_job_is_not_found() {
        let pool = test_pool().await;
        let store = LlmJobStore::new(pool);

        assert!(matches!(
            store
                .update("nope", UpdateLlmJobInput::default())
                .await,
            Err(Error::NotFound(_))
        ));
    }
}
