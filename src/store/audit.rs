//! Append-only audit log.
//!
//! Every state change caused by a core operation writes one row here. The
//! log is the source of truth for "what happened"; rows are never updated
//! or deleted.

use crate::db::parse_db_datetime;
use crate::error::{DbError, Result};
use crate::store::{AuditAction, EntityType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

/// One audit row.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    pub actor: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Record one state change. Runs on whatever executor the caller holds so
/// it can participate in the caller's transaction.
pub async fn log_audit<'e, E>(
    db: E,
    entity_type: EntityType,
    entity_id: &str,
    action: AuditAction,
    actor: &str,
    detail: Option<serde_json::Value>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let detail_json = detail.map(|d| d.to_string());

    sqlx::query(
        "INSERT INTO audit_log (entity_type, entity_id, action, actor, detail) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(action.as_str())
    .bind(actor)
    .bind(detail_json)
    .execute(db)
    .await
    .map_err(|e| DbError::Query(format!("audit insert: {e}")))?;

    Ok(())
}

/// Filters for the audit query endpoint.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub action: Option<AuditAction>,
    pub actor: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct AuditStore {
    pool: SqlitePool,
}

impl AuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Query audit rows, newest first. Ordered by `(created_at DESC, id
    /// DESC)` so rows written in the same millisecond stay deterministic.
    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditRecord>> {
        let mut sql = String::from("SELECT * FROM audit_log");
        let mut clauses: Vec<&str> = Vec::new();

        if filter.entity_type.is_some() {
            clauses.push("entity_type = ?");
        }
        if filter.entity_id.is_some() {
            clauses.push("entity_id = ?");
        }
        if filter.action.is_some() {
            clauses.push("action = ?");
        }
        if filter.actor.is_some() {
            clauses.push("actor = ?");
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(entity_type) = filter.entity_type {
            query = query.bind(entity_type.as_str());
        }
        if let Some(entity_id) = &filter.entity_id {
            query = query.bind(entity_id);
        }
        if let Some(action) = filter.action {
            query = query.bind(action.as_str());
        }
        if let Some(actor) = &filter.actor {
            query = query.bind(actor);
        }
        let limit = if filter.limit > 0 { filter.limit.min(500) } else { 50 };
        query = query.bind(limit).bind(filter.offset.max(0));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("audit query: {e}")))?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditRecord> {
    let entity_type_raw: String = row.try_get("entity_type")?;
    let action_raw: String = row.try_get("action")?;
    let detail_raw: Option<String> = row.try_get("detail")?;
    let created_raw: String = row.try_get("created_at")?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        entity_type: EntityType::parse(&entity_type_raw)
            .ok_or_else(|| DbError::Query(format!("unknown entity type {entity_type_raw:?}")))?,
        entity_id: row.try_get("entity_id")?,
        action: AuditAction::parse(&action_raw)
            .ok_or_else(|| DbError::Query(format!("unknown audit action {action_raw:?}")))?,
        actor: row.try_get("actor")?,
        detail: detail_raw.and_then(|d| serde_json::from_str(&d).ok()),
        created_at: parse_db_datetime(&created_raw)
            .ok_or_else(|| DbError::Query(format!("bad audit timestamp {created_raw:?}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_log_and_query_with_filters() {
        let pool = test_pool().await;

        log_audit(&pool, EntityType::Memory, "m1", AuditAction::Created, "user:1", None)
            .await
            .unwrap();
        log_audit(
            &pool,
            EntityType::Memory,
            "m1",
            AuditAction::Expired,
            "system:scheduler",
            Some(serde_json::json!({"reason": "suggested_tag_expiry"})),
        )
        .await
        .unwrap();
        log_audit(&pool, EntityType::Task, "t1", AuditAction::Created, "user:1", None)
            .await
            .unwrap();

        let store = AuditStore::new(pool);

        let all = store.query(AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        // Newest first; ties broken by id desc.
        assert!(all[0].id > all[1].id);

        let memories = store
            .query(AuditFilter {
                entity_type: Some(EntityType::Memory),
                entity_id: Some("m1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(memories.len(), 2);

        let expired = store
            .query(AuditFilter {
                action: Some(AuditAction::Expired),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].actor, "system:scheduler");
        assert_eq!(
            expired[0].detail.as_ref().and_then(|d| d["reason"].as_str()),
            Some("suggested_tag_expiry")
        );
    }
}
