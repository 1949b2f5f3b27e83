//! Memory CRUD storage (SQLite).
//!
//! Memories with media arrive as `pending` (awaiting classification) and
//! auto-expire after seven days unless confirmed; text memories are
//! `confirmed` immediately. Confirmed memories are mirrored into the FTS
//! index inside the same transaction as the row mutation.

use crate::db::{format_utc, now_utc_string, parse_db_datetime};
use crate::error::{DbError, Error, Result};
use crate::store::{
    ensure_user, log_audit, search, AuditAction, EntityType, MediaType, MemoryStatus, MemoryTag,
    PENDING_MEMORY_TTL_DAYS,
};
use crate::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct Memory {
    pub id: String,
    pub owner_user_id: UserId,
    pub content: Option<String>,
    pub media_type: Option<MediaType>,
    pub media_file_id: Option<String>,
    pub media_local_path: Option<String>,
    pub status: MemoryStatus,
    pub pending_expires_at: Option<DateTime<Utc>>,
    pub is_pinned: bool,
    pub source_chat_id: Option<i64>,
    pub source_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryWithTags {
    #[serde(flatten)]
    pub memory: Memory,
    pub tags: Vec<MemoryTag>,
}

#[derive(Debug, Clone)]
pub struct CreateMemoryInput {
    pub owner_user_id: UserId,
    pub content: Option<String>,
    pub media_type: Option<MediaType>,
    pub media_file_id: Option<String>,
    pub source_chat_id: Option<i64>,
    pub source_message_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMemoryInput {
    pub content: Option<String>,
    pub status: Option<MemoryStatus>,
    pub is_pinned: Option<bool>,
    pub media_local_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateMemoryInput) -> Result<Memory> {
        if input.content.is_none() && input.media_type.is_none() {
            return Err(Error::validation("memory needs content or media"));
        }

        let memory_id = crate::new_entity_id();
        let (status, pending_expires_at) = match input.media_type {
            // Media waits for classification before it becomes searchable.
            Some(_) => (
                MemoryStatus::Pending,
                Some(format_utc(Utc::now() + Duration::days(PENDING_MEMORY_TTL_DAYS))),
            ),
            None => (MemoryStatus::Confirmed, None),
        };

        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, input.owner_user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO memories (
                id, owner_user_id, content, media_type, media_file_id,
                status, pending_expires_at, source_chat_id, source_message_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&memory_id)
        .bind(input.owner_user_id)
        .bind(&input.content)
        .bind(input.media_type.map(|m| m.as_str()))
        .bind(&input.media_file_id)
        .bind(status.as_str())
        .bind(&pending_expires_at)
        .bind(input.source_chat_id)
        .bind(input.source_message_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("memory insert: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Memory,
            &memory_id,
            AuditAction::Created,
            &format!("user:{}", input.owner_user_id),
            None,
        )
        .await?;

        if status == MemoryStatus::Confirmed {
            search::index_memory(&mut tx, &memory_id).await?;
        }

        tx.commit().await?;

        self.get_memory(&memory_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("memory {memory_id}")))
    }

    /// Fetch a memory without tags.
    pub async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("memory fetch: {e}")))?;

        row.as_ref().map(memory_from_row).transpose()
    }

    /// Fetch a memory with its tags.
    pub async fn get(&self, id: &str) -> Result<Option<MemoryWithTags>> {
        let Some(memory) = self.get_memory(id).await? else {
            return Ok(None);
        };

        let tags = crate::store::tags::tags_for_memory(&self.pool, id).await?;
        Ok(Some(MemoryWithTags { memory, tags }))
    }

    pub async fn update(&self, id: &str, input: UpdateMemoryInput) -> Result<Memory> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM memories WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("memory fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("memory {id}")))?;
        let existing = memory_from_row(&row)?;

        let mut fields: Vec<&str> = Vec::new();
        let mut changed = serde_json::Map::new();

        if let Some(content) = &input.content {
            fields.push("content = ?");
            changed.insert("content".into(), serde_json::json!(content));
        }
        if let Some(status) = input.status {
            fields.push("status = ?");
            changed.insert("status".into(), serde_json::json!(status.as_str()));
        }
        if let Some(pinned) = input.is_pinned {
            fields.push("is_pinned = ?");
            changed.insert("is_pinned".into(), serde_json::json!(pinned));
        }
        if let Some(path) = &input.media_local_path {
            fields.push("media_local_path = ?");
            changed.insert("media_local_path".into(), serde_json::json!(path));
        }

        // pending_expires_at is non-null iff the memory is pending.
        let pending_expires_at = match input.status {
            Some(MemoryStatus::Confirmed) => {
                fields.push("pending_expires_at = ?");
                None
            }
            Some(MemoryStatus::Pending) => {
                fields.push("pending_expires_at = ?");
                Some(format_utc(Utc::now() + Duration::days(PENDING_MEMORY_TTL_DAYS)))
            }
            None => None,
        };

        fields.push("updated_at = ?");

        let sql = format!("UPDATE memories SET {} WHERE id = ?", fields.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(content) = &input.content {
            query = query.bind(content);
        }
        if let Some(status) = input.status {
            query = query.bind(status.as_str());
        }
        if let Some(pinned) = input.is_pinned {
            query = query.bind(pinned as i64);
        }
        if let Some(path) = &input.media_local_path {
            query = query.bind(path);
        }
        if input.status.is_some() {
            query = query.bind(&pending_expires_at);
        }
        query = query.bind(now_utc_string()).bind(id);

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("memory update: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Memory,
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

        // Keep the FTS row set consistent with the resulting status.
        let resulting_status = input.status.unwrap_or(existing.status);
        match resulting_status {
            MemoryStatus::Confirmed => search::index_memory(&mut tx, id).await?,
            MemoryStatus::Pending => search::remove_from_index(&mut tx, id).await?,
        }

        tx.commit().await?;

        self.get_memory(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("memory {id}")))
    }

    /// Delete a memory (tags cascade). Returns the deleted row so the
    /// caller can unlink its media blob.
    pub async fn delete(&self, id: &str) -> Result<Memory> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM memories WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("memory fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("memory {id}")))?;
        let memory = memory_from_row(&row)?;

        search::remove_from_index(&mut tx, id).await?;

        sqlx::query("DELETE FROM memories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("memory delete: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Memory,
            id,
            AuditAction::Deleted,
            &format!("user:{}", memory.owner_user_id),
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(memory)
    }
}

/// Unlink a media blob, logging failures instead of propagating them. The
/// database row is already gone; a stray file must not fail the operation.
pub fn remove_media_blob(path: &str) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(%path, "deleted media blob"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => tracing::error!(%path, %error, "failed to delete media blob"),
    }
}

pub(crate) fn memory_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Memory> {
    let status_raw: String = row.try_get("status")?;
    let media_type_raw: Option<String> = row.try_get("media_type")?;
    let pending_raw: Option<String> = row.try_get("pending_expires_at")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Memory {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        content: row.try_get("content")?,
        media_type: media_type_raw.as_deref().and_then(MediaType::parse),
        media_file_id: row.try_get("media_file_id")?,
        media_local_path: row.try_get("media_local_path")?,
        status: MemoryStatus::parse(&status_raw)
            .ok_or_else(|| DbError::Query(format!("unknown memory status {status_raw:?}")))?,
        pending_expires_at: pending_raw.as_deref().and_then(parse_db_datetime),
        is_pinned: row.try_get::<i64, _>("is_pinned")? != 0,
        source_chat_id: row.try_get("source_chat_id")?,
        source_message_id: row.try_get("source_message_id")?,
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

    fn text_input(owner: UserId, content: &str) -> CreateMemoryInput {
        CreateMemoryInput {
            owner_user_id: owner,
            content: Some(content.into()),
            media_type: None,
            media_file_id: None,
            source_chat_id: None,
            source_message_id: None,
        }
    }

    #[tokio::test]
    async fn test_text_memory_round_trip() {
        let pool = test_pool().await;
        let store = MemoryStore::new(pool.clone());

        let created = store.create(text_input(12345, "buy milk")).await.unwrap();
        assert_eq!(created.status, MemoryStatus::Confirmed);
        assert!(created.pending_expires_at.is_none());
        assert!(!created.is_pinned);

        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.memory.content.as_deref(), Some("buy milk"));
        assert_eq!(fetched.memory.owner_user_id, 12345);
        assert!(fetched.tags.is_empty());

        // Confirmed text memory is immediately searchable.
        let mut conn = pool.acquire().await.unwrap();
        let hits = crate::store::search::search_memories(&mut conn, "milk", 12345, false, 20, 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, created.id);
    }

    #[tokio::test]
    async fn test_media_memory_is_pending_with_expiry() {
        let pool = test_pool().await;
        let store = MemoryStore::new(pool.clone());

        let created = store
            .create(CreateMemoryInput {
                owner_user_id: 1,
                content: None,
                media_type: Some(MediaType::Image),
                media_file_id: Some("file-abc".into()),
                source_chat_id: None,
                source_message_id: None,
            })
            .await
            .unwrap();

        assert_eq!(created.status, MemoryStatus::Pending);
        let expires = created.pending_expires_at.expect("pending memory has expiry");
        let days = (expires - Utc::now()).num_days();
        assert!((6..=7).contains(&days), "expiry should be ~7 days out, got {days}");

        // Pending memories never appear in the index.
        let cached: Option<String> =
            sqlx::query_scalar("SELECT content FROM memories_fts_meta WHERE memory_id = ?")
                .bind(&created.id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_update_reindexes_and_repending_removes() {
        let pool = test_pool().await;
        let store = MemoryStore::new(pool.clone());

        let created = store.create(text_input(7, "call the plumber")).await.unwrap();

        let updated = store
            .update(
                &created.id,
                UpdateMemoryInput {
                    content: Some("call the electrician".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content.as_deref(), Some("call the electrician"));
        assert!(updated.updated_at >= created.updated_at);

        let mut conn = pool.acquire().await.unwrap();
        let hits = crate::store::search::search_memories(&mut conn, "electrician", 7, false, 20, 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let old = crate::store::search::search_memories(&mut conn, "plumber", 7, false, 20, 0)
            .await
            .unwrap();
        assert!(old.is_empty(), "stale content must leave the index");
        drop(conn);

        // Re-pending removes the FTS row and restores the expiry.
        let repended = store
            .update(
                &created.id,
                UpdateMemoryInput {
                    status: Some(MemoryStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(repended.pending_expires_at.is_some());

        let mut conn = pool.acquire().await.unwrap();
        let hits = crate::store::search::search_memories(&mut conn, "electrician", 7, false, 20, 0)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_index() {
        let pool = test_pool().await;
        let store = MemoryStore::new(pool.clone());

        let created = store.create(text_input(3, "passport renewal")).await.unwrap();
        store.delete(&created.id).await.unwrap();

        assert!(store.get(&created.id).await.unwrap().is_none());

        let mut conn = pool.acquire().await.unwrap();
        let hits = crate::store::search::search_memories(&mut conn, "passport", 3, false, 20, 0)
            .await
            .unwrap();
        assert!(hits.is_empty());

        // Deleting again is a 404.
        assert!(matches!(
            store.delete(&created.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
