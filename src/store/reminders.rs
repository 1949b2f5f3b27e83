//! Reminder CRUD storage (SQLite).
//!
//! Firing and recurrence live in the housekeeping scheduler; this store
//! covers the REST surface.

use crate::db::{format_utc, now_utc_string, parse_db_datetime};
use crate::error::{DbError, Error, Result};
use crate::store::{ensure_user, log_audit, AuditAction, EntityType};
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct Reminder {
    pub id: String,
    pub memory_id: Option<String>,
    pub owner_user_id: UserId,
    pub text: String,
    pub fire_at: DateTime<Utc>,
    pub recurrence_minutes: Option<i64>,
    pub fired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateReminderInput {
    pub owner_user_id: UserId,
    pub memory_id: Option<String>,
    pub text: String,
    pub fire_at: DateTime<Utc>,
    pub recurrence_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateReminderInput {
    pub text: Option<String>,
    pub fire_at: Option<DateTime<Utc>>,
    pub recurrence_minutes: Option<i64>,
}

/// Filters for the reminder listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct ReminderFilter {
    pub owner_user_id: Option<UserId>,
    pub fired: Option<bool>,
    pub upcoming_only: bool,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct ReminderStore {
    pool: SqlitePool,
}

impl ReminderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateReminderInput) -> Result<Reminder> {
        if input.text.trim().is_empty() {
            return Err(Error::validation("reminder text must not be empty"));
        }

        let reminder_id = crate::new_entity_id();
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, input.owner_user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO reminders (id, memory_id, owner_user_id, text, fire_at, recurrence_minutes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reminder_id)
        .bind(&input.memory_id)
        .bind(input.owner_user_id)
        .bind(input.text.trim())
        .bind(format_utc(input.fire_at))
        .bind(input.recurrence_minutes)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("reminder insert: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Reminder,
            &reminder_id,
            AuditAction::Created,
            &format!("user:{}", input.owner_user_id),
            None,
        )
        .await?;

        tx.commit().await?;

        self.get(&reminder_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("reminder {reminder_id}")))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("reminder fetch: {e}")))?;

        row.as_ref().map(reminder_from_row).transpose()
    }

    pub async fn list(&self, filter: ReminderFilter) -> Result<Vec<Reminder>> {
        let mut sql = String::from("SELECT * FROM reminders");
        let mut clauses: Vec<String> = Vec::new();

        if filter.owner_user_id.is_some() {
            clauses.push("owner_user_id = ?".into());
        }
        if filter.fired.is_some() {
            clauses.push("fired = ?".into());
        }
        if filter.upcoming_only {
            clauses.push("fired = 0".into());
            clauses.push("fire_at > ?".into());
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY fire_at ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(owner) = filter.owner_user_id {
            query = query.bind(owner);
        }
        if let Some(fired) = filter.fired {
            query = query.bind(fired as i64);
        }
        if filter.upcoming_only {
            query = query.bind(now_utc_string());
        }
        let limit = if filter.limit > 0 { filter.limit.min(500) } else { 50 };
        query = query.bind(limit).bind(filter.offset.max(0));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("reminder list: {e}")))?;

        rows.iter().map(reminder_from_row).collect()
    }

    pub async fn update(&self, id: &str, input: UpdateReminderInput) -> Result<Reminder> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("reminder fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("reminder {id}")))?;
        let existing = reminder_from_row(&row)?;

        let mut fields: Vec<&str> = Vec::new();
        let mut changed = serde_json::Map::new();

        if let Some(text) = &input.text {
            fields.push("text = ?");
            changed.insert("text".into(), serde_json::json!(text));
        }
        if let Some(fire_at) = input.fire_at {
            fields.push("fire_at = ?");
            changed.insert("fire_at".into(), serde_json::json!(format_utc(fire_at)));
        }
        if let Some(recurrence) = input.recurrence_minutes {
            fields.push("recurrence_minutes = ?");
            changed.insert("recurrence_minutes".into(), serde_json::json!(recurrence));
        }
        fields.push("updated_at = ?");

        let sql = format!("UPDATE reminders SET {} WHERE id = ?", fields.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(text) = &input.text {
            query = query.bind(text);
        }
        if let Some(fire_at) = input.fire_at {
            query = query.bind(format_utc(fire_at));
        }
        if let Some(recurrence) = input.recurrence_minutes {
            query = query.bind(recurrence);
        }
        query = query.bind(now_utc_string()).bind(id);

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("reminder update: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Reminder,
            id,
            AuditAction::Updated,
            &format!("user:{}", existing.owner_user_id),
            if changed.is_empty() {
                None
            } else {
                Some(serde_json::Value::Object(changed))
            },
        )
        .await?;

        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("reminder {id}")))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT owner_user_id FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("reminder fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("reminder {id}")))?;
        let owner: UserId = row.try_get("owner_user_id")?;

        sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("reminder delete: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Reminder,
            id,
            AuditAction::Deleted,
            &format!("user:{owner}"),
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn reminder_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Reminder> {
    let fire_raw: String = row.try_get("fire_at")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Reminder {
        id: row.try_get("id")?,
        memory_id: row.try_get("memory_id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        text: row.try_get("text")?,
        fire_at: parse_db_datetime(&fire_raw)
            .ok_or_else(|| DbError::Query(format!("bad fire_at {fire_raw:?}")))?,
        recurrence_minutes: row.try_get("recurrence_minutes")?,
        fired: row.try_get::<i64, _>("fired")? != 0,
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
    use chrono::Duration;

    #[tokio::test]
    async fn test_round_trip_and_upcoming_filter() {
        let pool = test_pool().await;
        let store = ReminderStore::new(pool);

        let future = store
            .create(CreateReminderInput {
                owner_user_id: 1,
                memory_id: None,
                text: "stretch".into(),
                fire_at: Utc::now() + Duration::hours(2),
                recurrence_minutes: None,
            })
            .await
            .unwrap();

        let past = store
            .create(CreateReminderInput {
                owner_user_id: 1,
                memory_id: None,
                text: "stale".into(),
                fire_at: Utc::now() - Duration::hours(2),
                recurrence_minutes: None,
            })
            .await
            .unwrap();

        let upcoming = store
            .list(ReminderFilter {
                owner_user_id: Some(1),
                upcoming_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, future.id);

        let all = store
            .list(ReminderFilter {
                owner_user_id: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        // fire_at ascending.
        assert_eq!(all[0].id, past.id);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let pool = test_pool().await;
        let store = ReminderStore::new(pool);

        let reminder = store
            .create(CreateReminderInput {
                owner_user_id: 4,
                memory_id: None,
                text: "original".into(),
                fire_at: Utc::now() + Duration::hours(1),
                recurrence_minutes: None,
            })
            .await
            .unwrap();

        let new_fire = Utc::now() + Duration::hours(6);
        let updated = store
            .update(
                &reminder.id,
                UpdateReminderInput {
                    text: Some("rescheduled".into()),
                    fire_at: Some(new_fire),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.text, "rescheduled");
        assert_eq!(
            updated.fire_at.timestamp_millis(),
            new_fire.timestamp_millis()
        );

        store.delete(&reminder.id).await.unwrap();
        assert!(store.get(&reminder.id).await.unwrap().is_none());
    }
}
