//! Memory tag storage (SQLite).
//!
//! Tags arrive either `confirmed` (user-supplied) or `suggested` (from the
//! image-tagging pipeline). Suggested tags expire after seven days unless
//! confirmed; only confirmed tags participate in search, so every tag
//! mutation re-indexes the owning memory in the same transaction.

use crate::db::{now_utc_string, parse_db_datetime};
use crate::error::{DbError, Error, Result};
use crate::store::{log_audit, search, AuditAction, EntityType, TagStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct MemoryTag {
    pub tag: String,
    pub status: TagStatus,
    pub suggested_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add tags to a memory. Re-adding an existing tag with `confirmed`
    /// promotes a suggestion; re-adding with `suggested` leaves a
    /// confirmed tag untouched.
    pub async fn add_tags(
        &self,
        memory_id: &str,
        tags: &[String],
        status: TagStatus,
        actor: &str,
    ) -> Result<Vec<MemoryTag>> {
        let cleaned: Vec<String> = tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if cleaned.is_empty() {
            return Err(Error::validation("no tags provided"));
        }

        let mut tx = self.pool.begin().await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM memories WHERE id = ?")
            .bind(memory_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("memory fetch: {e}")))?;
        if exists.is_none() {
            return Err(Error::not_found(format!("memory {memory_id}")));
        }

        let now = now_utc_string();
        for tag in &cleaned {
            match status {
                TagStatus::Confirmed => {
                    sqlx::query(
                        r#"
                        INSERT INTO memory_tags (memory_id, tag, status, confirmed_at)
                        VALUES (?, ?, 'confirmed', ?)
                        ON CONFLICT(memory_id, tag) DO UPDATE SET
                            status = 'confirmed',
                            confirmed_at = excluded.confirmed_at
                        "#,
                    )
                    .bind(memory_id)
                    .bind(tag)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DbError::Query(format!("tag upsert: {e}")))?;
                }
                TagStatus::Suggested => {
                    sqlx::query(
                        r#"
                        INSERT INTO memory_tags (memory_id, tag, status, suggested_at)
                        VALUES (?, ?, 'suggested', ?)
                        ON CONFLICT(memory_id, tag) DO NOTHING
                        "#,
                    )
                    .bind(memory_id)
                    .bind(tag)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DbError::Query(format!("tag insert: {e}")))?;
                }
            }
        }

        log_audit(
            &mut *tx,
            EntityType::Memory,
            memory_id,
            AuditAction::Updated,
            actor,
            Some(serde_json::json!({"tags_added": cleaned, "status": status.as_str()})),
        )
        .await?;

        // Confirmed tags change what the index should contain.
        if status == TagStatus::Confirmed {
            search::index_memory(&mut tx, memory_id).await?;
        }

        tx.commit().await?;

        tags_for_memory(&self.pool, memory_id).await
    }

    pub async fn delete_tag(&self, memory_id: &str, tag: &str, actor: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM memory_tags WHERE memory_id = ? AND tag = ?")
            .bind(memory_id)
            .bind(tag)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("tag delete: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("tag {tag} on memory {memory_id}")));
        }

        log_audit(
            &mut *tx,
            EntityType::Memory,
            memory_id,
            AuditAction::Updated,
            actor,
            Some(serde_json::json!({"tag_removed": tag})),
        )
        .await?;

        search::index_memory(&mut tx, memory_id).await?;

        tx.commit().await?;
        Ok(())
    }
}

/// All tags on a memory, confirmed first, then alphabetical.
pub(crate) async fn tags_for_memory(pool: &SqlitePool, memory_id: &str) -> Result<Vec<MemoryTag>> {
    let rows = sqlx::query(
        r#"
        SELECT tag, status, suggested_at, confirmed_at
        FROM memory_tags
        WHERE memory_id = ?
        ORDER BY status ASC, tag ASC
        "#,
    )
    .bind(memory_id)
    .fetch_all(pool)
    .await
    .map_err(|e| DbError::Query(format!("tags fetch: {e}")))?;

    rows.iter()
        .map(|row| {
            let status_raw: String = row.try_get("status")?;
            let suggested_raw: Option<String> = row.try_get("suggested_at")?;
            let confirmed_raw: Option<String> = row.try_get("confirmed_at")?;
            Ok(MemoryTag {
                tag: row.try_get("tag")?,
                status: TagStatus::parse(&status_raw)
                    .ok_or_else(|| DbError::Query(format!("unknown tag status {status_raw:?}")))?,
                suggested_at: suggested_raw.as_deref().and_then(parse_db_datetime),
                confirmed_at: confirmed_raw.as_deref().and_then(parse_db_datetime),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::store::{CreateMemoryInput, MemoryStore};

    async fn seed_memory(pool: &SqlitePool) -> String {
        MemoryStore::new(pool.clone())
            .create(CreateMemoryInput {
                owner_user_id: 1,
                content: Some("receipt from the hardware store".into()),
                media_type: None,
                media_file_id: None,
                source_chat_id: None,
                source_message_id: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_suggested_then_confirmed_promotion() {
        let pool = test_pool().await;
        let memory_id = seed_memory(&pool).await;
        let store = TagStore::new(pool.clone());

        let tags = store
            .add_tags(&memory_id, &["receipt".into()], TagStatus::Suggested, "system:llm_worker")
            .await
            .unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].status, TagStatus::Suggested);
        assert!(tags[0].suggested_at.is_some());
        assert!(tags[0].confirmed_at.is_none());

        let tags = store
            .add_tags(&memory_id, &["receipt".into()], TagStatus::Confirmed, "user:1")
            .await
            .unwrap();
        assert_eq!(tags[0].status, TagStatus::Confirmed);
        assert!(tags[0].confirmed_at.is_some());

        // Re-suggesting a confirmed tag does not demote it.
        let tags = store
            .add_tags(&memory_id, &["receipt".into()], TagStatus::Suggested, "system:llm_worker")
            .await
            .unwrap();
        assert_eq!(tags[0].status, TagStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_delete_tag_reindexes() {
        let pool = test_pool().await;
        let memory_id = seed_memory(&pool).await;
        let store = TagStore::new(pool.clone());

        store
            .add_tags(&memory_id, &["warranty".into()], TagStatus::Confirmed, "user:1")
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let hits = search::search_memories(&mut conn, "warranty", 1, false, 20, 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        drop(conn);

        store.delete_tag(&memory_id, "warranty", "user:1").await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let hits = search::search_memories(&mut conn, "warranty", 1, false, 20, 0)
            .await
            .unwrap();
        assert!(hits.is_empty());

        assert!(matches!(
            store.delete_tag(&memory_id, "warranty", "user:1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_tags_rejected() {
        let pool = test_pool().await;
        let memory_id = seed_memory(&pool).await;
        let store = TagStore::new(pool.clone());

        assert!(matches!(
            store
                .add_tags(&memory_id, &["  ".into()], TagStatus::Confirmed, "user:1")
                .await,
            Err(Error::Validation(_))
        ));
    }
}
