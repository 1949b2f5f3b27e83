//! Full-text search over confirmed memories (FTS5).
//!
//! The index is external-content: its content table is `memories_fts_meta`,
//! which doubles as the cache of the exact `(content, tags)` strings last
//! written into the index. Deleting from an external-content FTS5 table
//! requires those exact strings; any other value corrupts the index. Every
//! mutation therefore goes delete-with-cached-strings then insert-fresh,
//! with the cache updated in the same transaction. A delete without a
//! cache row is suppressed.

use crate::error::{DbError, Result};
use crate::store::memories::{memory_from_row, Memory};
use crate::UserId;
use serde::Serialize;
use sqlx::{Row as _, SqliteConnection};

/// Tokens dropped from search queries before building the match
/// expression. If every token is a stop word the original tokens are used
/// instead, so a query of only stop words still returns results.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "it", "this", "that", "are", "was", "be", "has", "had", "do", "does", "did",
    "will", "can", "could", "should", "would", "may", "might", "about", "all", "my", "me", "i",
    "you", "your", "we", "our", "they", "their", "what", "which", "who", "how", "when", "where",
    "find", "search", "show", "get", "list", "tell", "give",
];

/// A search result: the memory, its confirmed tags, and the FTS rank
/// (absent for the pinned-only fallback listing).
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub memory: Memory,
    pub tags: Vec<String>,
    pub score: Option<f64>,
}

/// Build the FTS match expression: split on whitespace, drop stop words
/// (falling back to the original tokens), quote each token, join with OR.
/// Returns None for an empty or whitespace-only query.
pub fn build_match_expression(query: &str) -> Option<String> {
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }

    let filtered: Vec<&str> = terms
        .iter()
        .copied()
        .filter(|t| !STOP_WORDS.contains(&t.to_lowercase().as_str()))
        .collect();
    let effective = if filtered.is_empty() { terms } else { filtered };

    let expression = effective
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ");

    Some(expression)
}

async fn cached_entry(
    db: &mut SqliteConnection,
    memory_id: &str,
) -> Result<Option<(i64, String, String)>> {
    let row = sqlx::query("SELECT rowid, content, tags FROM memories_fts_meta WHERE memory_id = ?")
        .bind(memory_id)
        .fetch_optional(db)
        .await
        .map_err(|e| DbError::Query(format!("fts cache fetch: {e}")))?;

    match row {
        None => Ok(None),
        Some(row) => Ok(Some((
            row.try_get("rowid")?,
            row.try_get("content")?,
            row.try_get("tags")?,
        ))),
    }
}

/// Current (rowid, content, tags-joined) for a memory, or None if the row
/// is gone.
async fn fresh_entry(
    db: &mut SqliteConnection,
    memory_id: &str,
) -> Result<Option<(i64, String, String)>> {
    let row = sqlx::query("SELECT rowid, COALESCE(content, '') AS content FROM memories WHERE id = ?")
        .bind(memory_id)
        .fetch_optional(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("memory fts fetch: {e}")))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let rowid: i64 = row.try_get("rowid")?;
    let content: String = row.try_get("content")?;

    let tags: Vec<String> = sqlx::query_scalar(
        "SELECT tag FROM memory_tags WHERE memory_id = ? AND status = 'confirmed' ORDER BY tag",
    )
    .bind(memory_id)
    .fetch_all(db)
    .await
    .map_err(|e| DbError::Query(format!("memory tags fetch: {e}")))?;

    Ok(Some((rowid, content, tags.join(" "))))
}

async fn emit_index_delete(
    db: &mut SqliteConnection,
    rowid: i64,
    content: &str,
    tags: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO memories_fts(memories_fts, rowid, content, tags) VALUES ('delete', ?, ?, ?)",
    )
    .bind(rowid)
    .bind(content)
    .bind(tags)
    .execute(db)
    .await
    .map_err(|e| DbError::Query(format!("fts delete: {e}")))?;
    Ok(())
}

/// Index or re-index one memory. Only confirmed memories are indexed; for
/// anything else the existing entry is removed.
pub async fn index_memory(db: &mut SqliteConnection, memory_id: &str) -> Result<()> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM memories WHERE id = ?")
        .bind(memory_id)
        .fetch_optional(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("memory status fetch: {e}")))?;

    match status.as_deref() {
        None => return Ok(()),
        Some("confirmed") => {}
        Some(_) => return remove_from_index(db, memory_id).await,
    }

    let Some((rowid, content, tags)) = fresh_entry(db, memory_id).await? else {
        return Ok(());
    };

    if let Some((cached_rowid, cached_content, cached_tags)) = cached_entry(db, memory_id).await? {
        emit_index_delete(db, cached_rowid, &cached_content, &cached_tags).await?;
    }

    sqlx::query("INSERT INTO memories_fts(rowid, content, tags) VALUES (?, ?, ?)")
        .bind(rowid)
        .bind(&content)
        .bind(&tags)
        .execute(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("fts insert: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO memories_fts_meta (rowid, memory_id, content, tags)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(memory_id) DO UPDATE SET
            rowid = excluded.rowid,
            content = excluded.content,
            tags = excluded.tags
        "#,
    )
    .bind(rowid)
    .bind(memory_id)
    .bind(&content)
    .bind(&tags)
    .execute(db)
    .await
    .map_err(|e| DbError::Query(format!("fts cache upsert: {e}")))?;

    Ok(())
}

/// Remove one memory from the index. No-op when there is no cache row:
/// deleting with anything but the cached strings would corrupt the index.
pub async fn remove_from_index(db: &mut SqliteConnection, memory_id: &str) -> Result<()> {
    let Some((rowid, content, tags)) = cached_entry(db, memory_id).await? else {
        return Ok(());
    };

    emit_index_delete(db, rowid, &content, &tags).await?;

    sqlx::query("DELETE FROM memories_fts_meta WHERE memory_id = ?")
        .bind(memory_id)
        .execute(db)
        .await
        .map_err(|e| DbError::Query(format!("fts cache delete: {e}")))?;

    Ok(())
}

/// Maintenance fallback: truncate the index and cache, then re-index every
/// confirmed memory.
pub async fn rebuild_index(db: &mut SqliteConnection) -> Result<()> {
    sqlx::query("INSERT INTO memories_fts(memories_fts) VALUES ('delete-all')")
        .execute(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("fts truncate: {e}")))?;
    sqlx::query("DELETE FROM memories_fts_meta")
        .execute(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("fts cache truncate: {e}")))?;

    let ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM memories WHERE status = 'confirmed' ORDER BY rowid")
            .fetch_all(&mut *db)
            .await
            .map_err(|e| DbError::Query(format!("confirmed memory scan: {e}")))?;

    for id in ids {
        index_memory(db, &id).await?;
    }

    Ok(())
}

/// FTS query with pin boost. Pinned matches always precede equally-relevant
/// unpinned matches; FTS rank ascends (best match first) within each group.
pub async fn search_memories(
    db: &mut SqliteConnection,
    query: &str,
    owner_user_id: UserId,
    pinned_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<SearchHit>> {
    let Some(expression) = build_match_expression(query) else {
        return Ok(Vec::new());
    };

    let mut sql = String::from(
        r#"
        SELECT m.*, memories_fts.rank AS rank
        FROM memories_fts
        JOIN memories m ON m.rowid = memories_fts.rowid
        WHERE memories_fts MATCH ?
          AND m.owner_user_id = ?
          AND m.status = 'confirmed'
        "#,
    );
    if pinned_only {
        sql.push_str(" AND m.is_pinned = 1");
    }
    sql.push_str(" ORDER BY m.is_pinned DESC, rank ASC LIMIT ? OFFSET ?");

    let rows = sqlx::query(&sql)
        .bind(&expression)
        .bind(owner_user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("fts query: {e}")))?;

    let mut hits = Vec::with_capacity(rows.len());
    for row in &rows {
        let memory = memory_from_row(row)?;
        let score: f64 = row.try_get("rank")?;
        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT tag FROM memory_tags WHERE memory_id = ? AND status = 'confirmed' ORDER BY tag",
        )
        .bind(&memory.id)
        .fetch_all(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("hit tags fetch: {e}")))?;

        hits.push(SearchHit {
            memory,
            tags,
            score: Some(score),
        });
    }

    Ok(hits)
}

/// Empty-query fallback for `pinned_only`: all confirmed pinned memories,
/// newest first, with a neutral score.
pub async fn pinned_memories(
    db: &mut SqliteConnection,
    owner_user_id: UserId,
    limit: i64,
    offset: i64,
) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM memories
        WHERE owner_user_id = ? AND status = 'confirmed' AND is_pinned = 1
        ORDER BY created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(owner_user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *db)
    .await
    .map_err(|e| DbError::Query(format!("pinned listing: {e}")))?;

    let mut hits = Vec::with_capacity(rows.len());
    for row in &rows {
        let memory = memory_from_row(row)?;
        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT tag FROM memory_tags WHERE memory_id = ? AND status = 'confirmed' ORDER BY tag",
        )
        .bind(&memory.id)
        .fetch_all(&mut *db)
        .await
        .map_err(|e| DbError::Query(format!("pinned tags fetch: {e}")))?;

        hits.push(SearchHit {
            memory,
            tags,
            score: None,
        });
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::store::{CreateMemoryInput, MemoryStore, TagStatus, TagStore, UpdateMemoryInput};

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

    #[test]
    fn test_build_match_expression() {
        assert_eq!(
            build_match_expression("buy milk"),
            Some("\"buy\" OR \"milk\"".to_string())
        );
        // Stop words drop out.
        assert_eq!(
            build_match_expression("find the milk"),
            Some("\"milk\"".to_string())
        );
        // All stop words: fall back to the original tokens.
        assert_eq!(
            build_match_expression("the and of"),
            Some("\"the\" OR \"and\" OR \"of\"".to_string())
        );
        assert_eq!(build_match_expression(""), None);
        assert_eq!(build_match_expression("   "), None);
        // Embedded quotes are escaped, not expression syntax.
        assert_eq!(
            build_match_expression("say \"hi\""),
            Some("\"say\" OR \"\"\"hi\"\"\"".to_string())
        );
    }

    #[tokio::test]
    async fn test_confirmed_tags_participate_in_search() {
        let pool = test_pool().await;
        let memories = MemoryStore::new(pool.clone());
        let tags = TagStore::new(pool.clone());

        let memory = memories.create(text_input(1, "weekend trip")).await.unwrap();
        tags.add_tags(&memory.id, &["travel".into()], TagStatus::Confirmed, "user:1")
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let hits = search_memories(&mut conn, "travel", 1, false, 20, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tags, vec!["travel".to_string()]);

        // Suggested tags do not.
        drop(conn);
        tags.add_tags(&memory.id, &["beach".into()], TagStatus::Suggested, "user:1")
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let hits = search_memories(&mut conn, "beach", 1, false, 20, 0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_pinned_ranks_above_equal_match() {
        let pool = test_pool().await;
        let memories = MemoryStore::new(pool.clone());

        let plain = memories.create(text_input(9, "dentist appointment")).await.unwrap();
        let pinned = memories.create(text_input(9, "dentist appointment")).await.unwrap();
        memories
            .update(
                &pinned.id,
                UpdateMemoryInput {
                    is_pinned: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let hits = search_memories(&mut conn, "dentist", 9, false, 20, 0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].memory.id, pinned.id, "pinned match precedes unpinned");
        assert_eq!(hits[1].memory.id, plain.id);
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let pool = test_pool().await;
        let memories = MemoryStore::new(pool.clone());

        memories.create(text_input(1, "secret recipe")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let hits = search_memories(&mut conn, "recipe", 2, false, 20, 0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_remove_without_cache_is_noop() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        // Nothing indexed; removal must not touch the index.
        remove_from_index(&mut conn, "no-such-memory").await.unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_restores_confirmed_rows() {
        let pool = test_pool().await;
        let memories = MemoryStore::new(pool.clone());

        let kept = memories.create(text_input(4, "garden tools")).await.unwrap();
        memories
            .create(CreateMemoryInput {
                owner_user_id: 4,
                content: None,
                media_type: Some(crate::store::MediaType::Image),
                media_file_id: Some("f1".into()),
                source_chat_id: None,
                source_message_id: None,
            })
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        rebuild_index(&mut conn).await.unwrap();

        let hits = search_memories(&mut conn, "garden", 4, false, 20, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, kept.id);

        let cache_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories_fts_meta")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(cache_rows, 1, "only confirmed memories are cached");
    }

    #[tokio::test]
    async fn test_pinned_fallback_listing() {
        let pool = test_pool().await;
        let memories = MemoryStore::new(pool.clone());

        let first = memories.create(text_input(5, "alpha")).await.unwrap();
        let second = memories.create(text_input(5, "beta")).await.unwrap();
        for id in [&first.id, &second.id] {
            memories
                .update(
                    id,
                    UpdateMemoryInput {
                        is_pinned: Some(true),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let mut conn = pool.acquire().await.unwrap();
        let hits = pinned_memories(&mut conn, 5, 20, 0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score.is_none()));
        // Creation-descending order.
        assert_eq!(hits[0].memory.id, second.id);
    }
}
