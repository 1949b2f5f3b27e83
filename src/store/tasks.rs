//! Task CRUD storage (SQLite).

use crate::db::{format_utc, now_utc_string, parse_db_datetime};
use crate::error::{DbError, Error, Result};
use crate::store::{ensure_user, log_audit, AuditAction, EntityType, TaskState};
use crate::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Row as _, SqlitePool};

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub memory_id: Option<String>,
    pub owner_user_id: UserId,
    pub description: String,
    pub state: TaskState,
    pub due_at: Option<DateTime<Utc>>,
    pub recurrence_minutes: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskInput {
    pub owner_user_id: UserId,
    pub memory_id: Option<String>,
    pub description: String,
    pub due_at: Option<DateTime<Utc>>,
    pub recurrence_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskInput {
    pub description: Option<String>,
    pub state: Option<TaskState>,
    pub due_at: Option<DateTime<Utc>>,
    pub recurrence_minutes: Option<i64>,
}

/// Result of a task update. Completing a recurring task inserts a
/// successor; its id is surfaced so callers can confirm the rollover.
#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdateOutcome {
    pub task: Task,
    pub recurring_task_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateTaskInput) -> Result<Task> {
        if input.description.trim().is_empty() {
            return Err(Error::validation("task description must not be empty"));
        }

        let task_id = crate::new_entity_id();
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, input.owner_user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, memory_id, owner_user_id, description, due_at, recurrence_minutes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task_id)
        .bind(&input.memory_id)
        .bind(input.owner_user_id)
        .bind(input.description.trim())
        .bind(input.due_at.map(format_utc))
        .bind(input.recurrence_minutes)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("task insert: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Task,
            &task_id,
            AuditAction::Created,
            &format!("user:{}", input.owner_user_id),
            None,
        )
        .await?;

        tx.commit().await?;

        self.get(&task_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("task {task_id}")))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbError::Query(format!("task fetch: {e}")))?;

        row.as_ref().map(task_from_row).transpose()
    }

    pub async fn list(&self, owner_user_id: UserId, state: Option<TaskState>) -> Result<Vec<Task>> {
        let rows = match state {
            Some(state) => {
                sqlx::query(
                    "SELECT * FROM tasks WHERE owner_user_id = ? AND state = ? ORDER BY created_at ASC",
                )
                .bind(owner_user_id)
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM tasks WHERE owner_user_id = ? ORDER BY created_at ASC")
                    .bind(owner_user_id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| DbError::Query(format!("task list: {e}")))?;

        rows.iter().map(task_from_row).collect()
    }

    pub async fn update(&self, id: &str, input: UpdateTaskInput) -> Result<TaskUpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("task fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("task {id}")))?;
        let existing = task_from_row(&row)?;

        let mut fields: Vec<&str> = Vec::new();
        let mut changed = serde_json::Map::new();

        if let Some(description) = &input.description {
            fields.push("description = ?");
            changed.insert("description".into(), serde_json::json!(description));
        }
        if let Some(state) = input.state {
            fields.push("state = ?");
            changed.insert("state".into(), serde_json::json!(state.as_str()));
        }
        if let Some(due_at) = input.due_at {
            fields.push("due_at = ?");
            changed.insert("due_at".into(), serde_json::json!(format_utc(due_at)));
        }
        if let Some(recurrence) = input.recurrence_minutes {
            fields.push("recurrence_minutes = ?");
            changed.insert("recurrence_minutes".into(), serde_json::json!(recurrence));
        }

        let completing =
            input.state == Some(TaskState::Done) && existing.state != TaskState::Done;
        if completing {
            fields.push("completed_at = ?");
        }
        fields.push("updated_at = ?");

        let now = now_utc_string();
        let sql = format!("UPDATE tasks SET {} WHERE id = ?", fields.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(description) = &input.description {
            query = query.bind(description);
        }
        if let Some(state) = input.state {
            query = query.bind(state.as_str());
        }
        if let Some(due_at) = input.due_at {
            query = query.bind(format_utc(due_at));
        }
        if let Some(recurrence) = input.recurrence_minutes {
            query = query.bind(recurrence);
        }
        if completing {
            query = query.bind(&now);
        }
        query = query.bind(&now).bind(id);

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("task update: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Task,
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

        // Completing a recurring task rolls a fresh NOT_DONE task forward
        // by the recurrence interval.
        let mut recurring_task_id = None;
        if completing {
            if let (Some(recurrence), Some(due_at)) = (existing.recurrence_minutes, existing.due_at)
            {
                let successor_id = crate::new_entity_id();
                let next_due = due_at + Duration::minutes(recurrence);

                sqlx::query(
                    r#"
                    INSERT INTO tasks (id, memory_id, owner_user_id, description, due_at, recurrence_minutes)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&successor_id)
                .bind(&existing.memory_id)
                .bind(existing.owner_user_id)
                .bind(&existing.description)
                .bind(format_utc(next_due))
                .bind(recurrence)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Query(format!("recurring task insert: {e}")))?;

                log_audit(
                    &mut *tx,
                    EntityType::Task,
                    &successor_id,
                    AuditAction::Created,
                    "system:api",
                    Some(serde_json::json!({"source": "recurrence"})),
                )
                .await?;

                recurring_task_id = Some(successor_id);
            }
        }

        tx.commit().await?;

        let task = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("task {id}")))?;

        Ok(TaskUpdateOutcome {
            task,
            recurring_task_id,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT owner_user_id FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("task fetch: {e}")))?
            .ok_or_else(|| Error::not_found(format!("task {id}")))?;
        let owner: UserId = row.try_get("owner_user_id")?;

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Query(format!("task delete: {e}")))?;

        log_audit(
            &mut *tx,
            EntityType::Task,
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

pub(crate) fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    let state_raw: String = row.try_get("state")?;
    let due_raw: Option<String> = row.try_get("due_at")?;
    let completed_raw: Option<String> = row.try_get("completed_at")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Task {
        id: row.try_get("id")?,
        memory_id: row.try_get("memory_id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        description: row.try_get("description")?,
        state: TaskState::parse(&state_raw)
            .ok_or_else(|| DbError::Query(format!("unknown task state {state_raw:?}")))?,
        due_at: due_raw.as_deref().and_then(parse_db_datetime),
        recurrence_minutes: row.try_get("recurrence_minutes")?,
        completed_at: completed_raw.as_deref().and_then(parse_db_datetime),
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
    use chrono::TimeZone as _;

    #[tokio::test]
    async fn test_create_list_and_state_filter() {
        let pool = test_pool().await;
        let store = TaskStore::new(pool);

        let open = store
            .create(CreateTaskInput {
                owner_user_id: 1,
                memory_id: None,
                description: "water the plants".into(),
                due_at: None,
                recurrence_minutes: None,
            })
            .await
            .unwrap();
        assert_eq!(open.state, TaskState::NotDone);

        let done = store
            .create(CreateTaskInput {
                owner_user_id: 1,
                memory_id: None,
                description: "already handled".into(),
                due_at: None,
                recurrence_minutes: None,
            })
            .await
            .unwrap();
        store
            .update(
                &done.id,
                UpdateTaskInput {
                    state: Some(TaskState::Done),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let not_done = store.list(1, Some(TaskState::NotDone)).await.unwrap();
        assert_eq!(not_done.len(), 1);
        assert_eq!(not_done[0].id, open.id);

        let all = store.list(1, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_completing_recurring_task_rolls_forward() {
        let pool = test_pool().await;
        let store = TaskStore::new(pool);

        let due = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();
        let task = store
            .create(CreateTaskInput {
                owner_user_id: 2,
                memory_id: None,
                description: "take out the bins".into(),
                due_at: Some(due),
                recurrence_minutes: Some(60 * 24 * 7),
            })
            .await
            .unwrap();

        let outcome = store
            .update(
                &task.id,
                UpdateTaskInput {
                    state: Some(TaskState::Done),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.task.state, TaskState::Done);
        assert!(outcome.task.completed_at.is_some());

        let successor_id = outcome.recurring_task_id.expect("successor created");
        let successor = store.get(&successor_id).await.unwrap().unwrap();
        assert_eq!(successor.state, TaskState::NotDone);
        assert_eq!(successor.due_at, Some(due + Duration::minutes(60 * 24 * 7)));
        assert_eq!(successor.recurrence_minutes, task.recurrence_minutes);

        // Completing the already-done task again does not spawn another.
        let again = store
            .update(
                &task.id,
                UpdateTaskInput {
                    state: Some(TaskState::Done),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(again.recurring_task_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_then_get_is_gone() {
        let pool = test_pool().await;
        let store = TaskStore::new(pool);

        let task = store
            .create(CreateTaskInput {
                owner_user_id: 3,
                memory_id: None,
                description: "one-shot".into(),
                due_at: None,
                recurrence_minutes: None,
            })
            .await
            .unwrap();

        store.delete(&task.id).await.unwrap();
        assert!(store.get(&task.id).await.unwrap().is_none());
        assert!(matches!(store.delete(&task.id).await, Err(Error::NotFound(_))));
    }
}
