//! Housekeeping scheduler: time-based side effects for the Core service.
//!
//! A single long-running task ticks every N seconds. Each tick runs four
//! independent actions; a failure in one never prevents the others from
//! running in the same tick. Within an action, all row mutations commit
//! once at the end. Notifications are published before the mutation
//! commits, so a crash between publish and commit replays the
//! notification on the next tick: delivery is at-least-once.

use crate::db::{format_utc, now_utc_string, parse_db_datetime};
use crate::error::{DbError, Result};
use crate::store::{
    log_audit, remove_from_index, AuditAction, EntityType, EVENT_REPROMPT_AFTER_HOURS,
    SUGGESTED_TAG_TTL_DAYS,
};
use crate::streams::{Notification, OutboundPublisher, NOTIFY_EVENT_REPROMPT, NOTIFY_REMINDER};
use crate::UserId;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{Row as _, SqlitePool};
use std::sync::Arc;
use tokio::time::Duration;

pub struct Scheduler {
    pool: SqlitePool,
    publisher: Arc<dyn OutboundPublisher>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, publisher: Arc<dyn OutboundPublisher>, interval_secs: u64) -> Self {
        Self {
            pool,
            publisher,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run the tick loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler started");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        // Skip catch-up ticks if a tick overruns; keep the cadence.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One housekeeping pass. Each action is isolated: an error is logged
    /// and the remaining actions still run.
    pub async fn tick(&self) {
        if let Err(error) = self.fire_due_reminders().await {
            tracing::error!(%error, "error firing reminders");
        }
        if let Err(error) = self.expire_pending_memories().await {
            tracing::error!(%error, "error expiring pending memories");
        }
        if let Err(error) = self.expire_suggested_tags().await {
            tracing::error!(%error, "error expiring suggested tags");
        }
        if let Err(error) = self.requeue_stale_events().await {
            tracing::error!(%error, "error re-queuing stale events");
        }
    }

    /// Action A: fire due reminders, inserting a successor row for
    /// recurring ones.
    async fn fire_due_reminders(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let due = sqlx::query(
            r#"
            SELECT r.id, r.memory_id, r.owner_user_id, r.text, r.fire_at,
                   r.recurrence_minutes, m.content AS memory_content
            FROM reminders r
            LEFT JOIN memories m ON r.memory_id = m.id
            WHERE r.fired = 0 AND r.fire_at <= ?
            "#,
        )
        .bind(now_utc_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("due reminder scan: {e}")))?;

        if due.is_empty() {
            return Ok(());
        }

        for row in &due {
            let reminder_id: String = row.try_get("id")?;
            let memory_id: Option<String> = row.try_get("memory_id")?;
            let owner_user_id: UserId = row.try_get("owner_user_id")?;
            let fire_at_raw: String = row.try_get("fire_at")?;
            let recurrence_minutes: Option<i64> = row.try_get("recurrence_minutes")?;
            let memory_content: Option<String> = row.try_get("memory_content")?;

            // Publish first; the fired flag persists at commit. A crash in
            // between replays this notification next tick.
            self.publisher
                .publish_notification(&Notification::new(
                    NOTIFY_REMINDER,
                    Some(owner_user_id),
                    serde_json::json!({
                        "reminder_id": reminder_id,
                        "memory_id": memory_id,
                        "memory_content": memory_content,
                        "fire_at": fire_at_raw,
                    }),
                ))
                .await?;

            sqlx::query("UPDATE reminders SET fired = 1, updated_at = ? WHERE id = ?")
                .bind(now_utc_string())
                .bind(&reminder_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Query(format!("mark fired: {e}")))?;

            if let Some(recurrence) = recurrence_minutes {
                let old_fire_at = parse_db_datetime(&fire_at_raw)
                    .ok_or_else(|| DbError::Query(format!("bad fire_at {fire_at_raw:?}")))?;
                let next_fire_at = old_fire_at + ChronoDuration::minutes(recurrence);
                let successor_id = crate::new_entity_id();

                sqlx::query(
                    r#"
                    INSERT INTO reminders (id, memory_id, owner_user_id, text, fire_at, recurrence_minutes, fired)
                    SELECT ?, memory_id, owner_user_id, text, ?, recurrence_minutes, 0
                    FROM reminders WHERE id = ?
                    "#,
                )
                .bind(&successor_id)
                .bind(format_utc(next_fire_at))
                .bind(&reminder_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Query(format!("recurring reminder insert: {e}")))?;

                log_audit(
                    &mut *tx,
                    EntityType::Reminder,
                    &successor_id,
                    AuditAction::Created,
                    "system:scheduler",
                    Some(serde_json::json!({"source": "recurrence"})),
                )
                .await?;
            }

            log_audit(
                &mut *tx,
                EntityType::Reminder,
                &reminder_id,
                AuditAction::Fired,
                "system:scheduler",
                None,
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = due.len(), "fired due reminders");
        Ok(())
    }

    /// Action B: delete pending media memories past their expiry.
    async fn expire_pending_memories(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query(
            "SELECT id, media_local_path FROM memories WHERE status = 'pending' AND pending_expires_at <= ?",
        )
        .bind(now_utc_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("expired memory scan: {e}")))?;

        if expired.is_empty() {
            return Ok(());
        }

        let mut media_paths = Vec::new();
        for row in &expired {
            let memory_id: String = row.try_get("id")?;
            let media_local_path: Option<String> = row.try_get("media_local_path")?;

            // Pending memories should never be indexed; the removal is a
            // no-op unless something slipped through.
            remove_from_index(&mut tx, &memory_id).await?;

            sqlx::query("DELETE FROM memories WHERE id = ?")
                .bind(&memory_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Query(format!("expired memory delete: {e}")))?;

            log_audit(
                &mut *tx,
                EntityType::Memory,
                &memory_id,
                AuditAction::Expired,
                "system:scheduler",
                None,
            )
            .await?;

            if let Some(path) = media_local_path {
                media_paths.push(path);
            }
        }

        tx.commit().await?;

        for path in media_paths {
            crate::store::remove_media_blob(&path);
        }

        tracing::info!(count = expired.len(), "expired pending memories");
        Ok(())
    }

    /// Action C: delete suggested tags older than seven days.
    async fn expire_suggested_tags(&self) -> Result<()> {
        let cutoff = format_utc(Utc::now() - ChronoDuration::days(SUGGESTED_TAG_TTL_DAYS));
        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query(
            "SELECT memory_id, tag FROM memory_tags WHERE status = 'suggested' AND suggested_at <= ?",
        )
        .bind(&cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("expired tag scan: {e}")))?;

        if expired.is_empty() {
            return Ok(());
        }

        for row in &expired {
            let memory_id: String = row.try_get("memory_id")?;
            let tag: String = row.try_get("tag")?;

            sqlx::query("DELETE FROM memory_tags WHERE memory_id = ? AND tag = ?")
                .bind(&memory_id)
                .bind(&tag)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Query(format!("expired tag delete: {e}")))?;

            log_audit(
                &mut *tx,
                EntityType::Memory,
                &memory_id,
                AuditAction::Expired,
                "system:scheduler",
                Some(serde_json::json!({"tag": tag, "reason": "suggested_tag_expiry"})),
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = expired.len(), "expired suggested tags");
        Ok(())
    }

    /// Action D: re-prompt events pending for more than 24 hours and
    /// refresh their pending clock.
    async fn requeue_stale_events(&self) -> Result<()> {
        let cutoff = format_utc(Utc::now() - ChronoDuration::hours(EVENT_REPROMPT_AFTER_HOURS));
        let mut tx = self.pool.begin().await?;

        let stale = sqlx::query(
            "SELECT id, owner_user_id, description, event_time FROM events WHERE status = 'pending' AND pending_since <= ?",
        )
        .bind(&cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DbError::Query(format!("stale event scan: {e}")))?;

        if stale.is_empty() {
            return Ok(());
        }

        for row in &stale {
            let event_id: String = row.try_get("id")?;
            let owner_user_id: UserId = row.try_get("owner_user_id")?;
            let description: String = row.try_get("description")?;
            let event_time: String = row.try_get("event_time")?;

            self.publisher
                .publish_notification(&Notification::new(
                    NOTIFY_EVENT_REPROMPT,
                    Some(owner_user_id),
                    serde_json::json!({
                        "event_id": event_id,
                        "description": description,
                        "event_date": event_time,
                    }),
                ))
                .await?;

            sqlx::query("UPDATE events SET pending_since = ?, updated_at = ? WHERE id = ?")
                .bind(now_utc_string())
                .bind(now_utc_string())
                .bind(&event_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Query(format!("pending refresh: {e}")))?;

            log_audit(
                &mut *tx,
                EntityType::Event,
                &event_id,
                AuditAction::Requeued,
                "system:scheduler",
                None,
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = stale.len(), "re-queued stale events");
        Ok(())
    }
}
