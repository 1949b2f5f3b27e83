//! Backup status storage (SQLite). Read-only from the REST surface;
//! rows are written by an external backup process.

use crate::db::parse_db_datetime;
use crate::error::{DbError, Result};
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct BackupJob {
    pub id: String,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub file_path: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    pool: SqlitePool,
}

impl BackupStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Latest backup status for a user, or None if no backup has run.
    pub async fn latest_for_user(&self, user_id: UserId) -> Result<Option<BackupJob>> {
        let row = sqlx::query(
            "SELECT * FROM backup_metadata WHERE user_id = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DbError::Query(format!("backup fetch: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let started_raw: String = row.try_get("started_at")?;
        let completed_raw: Option<String> = row.try_get("completed_at")?;

        Ok(Some(BackupJob {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            started_at: parse_db_datetime(&started_raw)
                .ok_or_else(|| DbError::Query(format!("bad started_at {started_raw:?}")))?,
            completed_at: completed_raw.as_deref().and_then(parse_db_datetime),
            status: row.try_get("status")?,
            file_path: row.try_get("file_path")?,
            error_message: row.try_get("error_message")?,
        }))
    }
}
