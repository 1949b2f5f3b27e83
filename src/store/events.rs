//! Event CRUD storage (SQLite).
//!
//! Events extracted from email arrive as `pending` and are re-prompted by
//! the scheduler when they sit unconfirmed for more than 24 hours.

use crate::db::{format_utc, now_utc_string, parse_db_datetime};
use crate::error::{DbError, Error, Result};
use crate::store::{ensure_user, log_audit, AuditAction, EntityType, EventSourceType, EventStatus};
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub owner_user_id: UserId,
    pub description: String,
    pub event_time: DateTime<Utc>,
    pub status: EventStatus,
    pub pending_since: Option<DateTime<Utc>>,
    pub source_type: EventSourceType,
    pub source_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateEventInput {
    pub owner_user_id: UserId,
    pub description: String,
    pub event_time: DateTime<Utc>,
    pub source_type: EventSourceType,
    pub source_detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEventInput {
    pub description: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub status: Option<EventStatus>,
}

#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateEventInput) -> Result<Event> {
        if input.description.trim().is_empty() {
            return Err(Error::validation("event description must not be empty"));
        }

        let event_id = crate::new_entity_id();
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, input.owner_user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO events (
                id, owner_user_id, description, event_time, status,
                pending_since, source_type, source_detail
            )
            VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(&event_id)
        .bind(input.owner_user_id)
        .bind(input.description.trim())
        .bind(format_utc(input.event_time))
        .bind(now_utc_string())
        .bind(input.source_type.as_str())
        .bind(&input.source_detail)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("event insert: {e}")))?;

        let actor = match input.source_type {
            EventSourceType::Email => "system:llm_worker".to_string(),
            EventSourceType::Manual => format!("user:{}", input.owner_user_id),
        };
        log_audit(
            &mut *tx,
            EntityType::Event,
            &event_id,
            AuditAction::Created,
            &actor,
            None,
        )
        .await?;

        tx.commit().await?;

        self.get(&event_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("event {event_id}")))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("event fetch: {e}")))?;

        row.as_ref().map(event_from_row).transpose()
    }

    pub async fn list(
        &self,
        owner_user_id: Option<UserId>,
        status: Option<EventStatus>,
    ) -> Result<Vec<Event>> {
        let mut sql = String::from("SELECT * FROM events");
        let mut clauses: Vec<&str> = Vec::new();

        if owner_user_id.is_some() {
            clauses.push("owner_user_id = ?");
        }
        if status.is_some() {
            clauses.push("status = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY event_time ASC");

        let mut query = sqlx::query(&sql);
        if let Some(owner) = owner_user_id {
            query = query.bind(owner);
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("event list: {e}")))?;

        rows.iter().map(event_from_row).collect()
    }

    pub async fn update(&self, id: &str, input: UpdateEventInput) -> Result<Event> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("event fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("event {id}")))?;
        let existing = event_from_row(&row)?;

        let mut fields: Vec<&str> = Vec::new();
        let mut changed = serde_json::Map::new();

        if let Some(description) = &input.description {
            fields.push("description = ?");
            changed.insert("description".into(), serde_json::json!(description));
        }
        if let Some(event_time) = input.event_time {
            fields.push("event_time = ?");
            changed.insert("event_time".into(), serde_json::json!(format_utc(event_time)));
        }
        if let Some(status) = input.status {
            fields.push("status = ?");
            changed.insert("status".into(), serde_json::json!(status.as_str()));
            // Leaving pending clears the re-prompt clock.
            fields.push("pending_since = ?");
        }
        fields.push("updated_at = ?");

        let pending_since = match input.status {
            Some(EventStatus::Pending) => Some(now_utc_string()),
            Some(_) => None,
            None => None,
        };

        let sql = format!("UPDATE events SET {} WHERE id = ?", fields.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(description) = &input.description {
            query = query.bind(description);
        }
        if let Some(event_time) = input.event_time {
            query = query.bind(format_utc(event_time));
        }
        if input.status.is_some() {
            query = query.bind(input.status.map(|s| s.as_str().to_string()));
            query = query.bind(&pending_since);
        }
        query = query.bind(now_utc_string()).bind(id);

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("event update: {e}")))?;

        let action = match input.status {
            Some(EventStatus::Confirmed) => AuditAction::Confirmed,
            Some(EventStatus::Rejected) => AuditAction::Rejected,
            _ => AuditAction::Updated,
        };
        log_audit(
            &mut *tx,
            EntityType::Event,
            id,
            action,
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
            .ok_or_else(|| Error::not_found(format!("event {id}")))
    }
}

pub(crate) fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
    let status_raw: String = row.try_get("status")?;
    let source_raw: String = row.try_get("source_type")?;
    let event_time_raw: String = row.try_get("event_time")?;
    let pending_raw: Option<String> = row.try_get("pending_since")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Event {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        description: row.try_get("description")?,
        event_time: parse_db_datetime(&event_time_raw)
            .ok_or_else(|| DbError::Query(format!("bad event_time {event_time_raw:?}")))?,
        status: EventStatus::parse(&status_raw)
            .ok_or_else(|| DbError::Query(format!("unknown event status {status_raw:?}")))?,
        pending_since: pending_raw.as_deref().and_then(parse_db_datetime),
        source_type: EventSourceType::parse(&source_raw)
            .ok_or_else(|| DbError::Query(format!("unknown source type {source_raw:?}")))?,
        source_detail: row.try_get("source_detail")?,
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
    async fn test_create_confirm_clears_pending_since() {
        let pool = test_pool().await;
        let store = EventStore::new(pool);

        let event = store
            .create(CreateEventInput {
                owner_user_id: 1,
                description: "dentist on friday".into(),
                event_time: Utc::now() + Duration::days(3),
                source_type: EventSourceType::Email,
                source_detail: Some("Fwd: appointment".into()),
            })
            .await
            .unwrap();
        assert_eq!(event.status, EventStatus::Pending);
        assert!(event.pending_since.is_some());

        let confirmed = store
            .update(
                &event.id,
                UpdateEventInput {
                    status: Some(EventStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.status, EventStatus::Confirmed);
        assert!(confirmed.pending_since.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let pool = test_pool().await;
        let store = EventStore::new(pool);

        let first = store
            .create(CreateEventInput {
                owner_user_id: 2,
                description: "pending thing".into(),
                event_time: Utc::now(),
                source_type: EventSourceType::Manual,
                source_detail: None,
            })
            .await
            .unwrap();
        let second = store
            .create(CreateEventInput {
                owner_user_id: 2,
                description: "rejected thing".into(),
                event_time: Utc::now(),
                source_type: EventSourceType::Manual,
                source_detail: None,
            })
            .await
            .unwrap();
        store
            .update(
                &second.id,
                UpdateEventInput {
                    status: Some(EventStatus::Rejected),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let pending = store.list(Some(2), Some(EventStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }
}
