//! Per-user settings storage (SQLite). Upserted, never deleted.

use crate::db::{now_utc_string, parse_db_datetime};
use crate::error::{DbError, Result};
use crate::store::ensure_user;
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct UserSettings {
    pub user_id: UserId,
    pub timezone: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Settings for a user, or None if never written.
    pub async fn get(&self, user_id: UserId) -> Result<Option<UserSettings>> {
        let row = sqlx::query("SELECT * FROM user_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("settings fetch: {e}")))?;

        row.as_ref().map(settings_from_row).transpose()
    }

    /// Upsert settings. Omitted fields keep their stored (or default)
    /// values; upserting N times leaves exactly one row.
    pub async fn upsert(
        &self,
        user_id: UserId,
        timezone: Option<String>,
        language: Option<String>,
    ) -> Result<UserSettings> {
        let existing = self.get(user_id).await?;
        let timezone = timezone
            .or_else(|| existing.as_ref().map(|s| s.timezone.clone()))
            .unwrap_or_else(|| "UTC".into());
        let language = language
            .or_else(|| existing.as_ref().map(|s| s.language.clone()))
            .unwrap_or_else(|| "en".into());

        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, timezone, language, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                timezone = excluded.timezone,
                language = excluded.language,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&timezone)
        .bind(&language)
        .bind(now_utc_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("settings upsert: {e}")))?;

        tx.commit().await?;

        self.get(user_id).await?.ok_or_else(|| {
            DbError::Query(format!("settings row missing after upsert for user {user_id}")).into()
        })
    }
}

fn settings_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserSettings> {
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(UserSettings {
        user_id: row.try_get("user_id")?,
        timezone: row.try_get("timezone")?,
        language: row.try_get("language")?,
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
    async fn test_upsert_keeps_single_row() {
        let pool = test_pool().await;
        let store = SettingsStore::new(pool.clone());

        assert!(store.get(9).await.unwrap().is_none());

        let first = store.upsert(9, Some("Europe/Berlin".into()), None).await.unwrap();
        assert_eq!(first.timezone, "Europe/Berlin");
        assert_eq!(first.language, "en");

        // Partial update keeps the other field.
        let second = store.upsert(9, None, Some("de".into())).await.unwrap();
        assert_eq!(second.timezone, "Europe/Berlin");
        assert_eq!(second.language, "de");

        let third = store.upsert(9, None, None).await.unwrap();
        assert_eq!(third.timezone, "Europe/Berlin");
        assert_eq!(third.language, "de");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_settings WHERE user_id = 9")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
