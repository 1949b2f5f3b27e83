//! Per-user pending-action state machine for multi-step callback flows.
//!
//! When a callback button starts a flow (add tags, custom due date,
//! custom reminder time), the gateway parks a pending action keyed by
//! user id; the user's next text message is routed here instead of being
//! saved as a memory. States expire on their own so an abandoned flow
//! cannot swallow a message days later.

use crate::db::format_utc;
use crate::error::Result;
use crate::gateway::core_client::GatewayApi;
use crate::UserId;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::time::Duration;

/// How long a pending action survives without input.
const PENDING_ACTION_TTL_SECS: u64 = 15 * 60;

/// What the gateway is waiting for from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    AwaitingTags { memory_id: String },
    AwaitingDueDate { memory_id: String },
    AwaitingReminderTime { memory_id: String },
}

/// TTL store of pending actions, keyed by user id.
pub struct PendingActionStore {
    cache: moka::future::Cache<UserId, PendingAction>,
}

impl PendingActionStore {
    pub fn new() -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(PENDING_ACTION_TTL_SECS))
                .build(),
        }
    }

    pub async fn set(&self, user_id: UserId, action: PendingAction) {
        self.cache.insert(user_id, action).await;
    }

    /// Remove and return the user's pending action, transitioning the
    /// user back to idle.
    pub async fn take(&self, user_id: UserId) -> Option<PendingAction> {
        self.cache.remove(&user_id).await
    }

    pub async fn peek(&self, user_id: UserId) -> Option<PendingAction> {
        self.cache.get(&user_id).await
    }

    pub async fn clear(&self, user_id: UserId) {
        self.cache.invalidate(&user_id).await;
    }
}

impl Default for PendingActionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the date/time formats users actually type. Returns a UTC-aware
/// datetime.
pub fn parse_user_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%d/%m/%Y %H:%M"];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

/// Route a text message through the user's pending action, if any.
///
/// Returns `Some(reply)` when the message was consumed by a flow, `None`
/// when the user is idle and the message should take the normal path.
pub async fn handle_pending_input(
    store: &PendingActionStore,
    api: &dyn GatewayApi,
    user_id: UserId,
    text: &str,
) -> Result<Option<String>> {
    let Some(action) = store.take(user_id).await else {
        return Ok(None);
    };

    let reply = match action {
        PendingAction::AwaitingTags { memory_id } => {
            let tags: Vec<String> = text
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();

            if tags.is_empty() {
                // Still waiting for usable tags.
                store
                    .set(user_id, PendingAction::AwaitingTags { memory_id })
                    .await;
                "Please provide at least one tag.".to_string()
            } else {
                match api.add_tags(&memory_id, &tags, "confirmed").await {
                    Ok(()) => format!("Tags added: {}", tags.join(", ")),
                    Err(error) => {
                        tracing::error!(%memory_id, %error, "failed to add tags");
                        store
                            .set(user_id, PendingAction::AwaitingTags { memory_id })
                            .await;
                        "Failed to add tags. Please try again.".to_string()
                    }
                }
            }
        }

        PendingAction::AwaitingDueDate { memory_id } => match parse_user_datetime(text) {
            None => {
                store
                    .set(user_id, PendingAction::AwaitingDueDate { memory_id })
                    .await;
                "Could not parse the date. Please use format YYYY-MM-DD HH:MM (e.g., 2026-12-25 09:00)."
                    .to_string()
            }
            Some(due_at) => {
                match api
                    .create_task(user_id, &memory_id, "Follow up on this memory", &format_utc(due_at))
                    .await
                {
                    Ok(()) => format!("Task created with due date: {}", due_at.format("%Y-%m-%d %H:%M")),
                    Err(error) => {
                        tracing::error!(%memory_id, %error, "failed to create task");
                        "Failed to create task. Please try again.".to_string()
                    }
                }
            }
        },

        PendingAction::AwaitingReminderTime { memory_id } => match parse_user_datetime(text) {
            None => {
                store
                    .set(user_id, PendingAction::AwaitingReminderTime { memory_id })
                    .await;
                "Could not parse the time. Please use format YYYY-MM-DD HH:MM (e.g., 2026-12-25 09:00)."
                    .to_string()
            }
            Some(fire_at) => {
                match api
                    .create_reminder(user_id, &memory_id, "About this memory", &format_utc(fire_at))
                    .await
                {
                    Ok(()) => format!("Reminder set for {}", fire_at.format("%Y-%m-%d %H:%M")),
                    Err(error) => {
                        tracing::error!(%memory_id, %error, "failed to create reminder");
                        "Failed to create reminder. Please try again.".to_string()
                    }
                }
            }
        },
    };

    Ok(Some(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubApi {
        tag_calls: Mutex<Vec<(String, Vec<String>, String)>>,
        task_calls: Mutex<Vec<(UserId, String, String)>>,
        reminder_calls: Mutex<Vec<(UserId, String, String)>>,
        fail_tags: bool,
    }

    #[async_trait::async_trait]
    impl GatewayApi for StubApi {
        async fn add_tags(&self, memory_id: &str, tags: &[String], status: &str) -> Result<()> {
            if self.fail_tags {
                return Err(anyhow::anyhow!("core down").into());
            }
            self.tag_calls.lock().unwrap().push((
                memory_id.to_string(),
                tags.to_vec(),
                status.to_string(),
            ));
            Ok(())
        }

        async fn create_task(
            &self,
            owner_user_id: UserId,
            memory_id: &str,
            _description: &str,
            due_at: &str,
        ) -> Result<()> {
            self.task_calls.lock().unwrap().push((
                owner_user_id,
                memory_id.to_string(),
                due_at.to_string(),
            ));
            Ok(())
        }

        async fn create_reminder(
            &self,
            owner_user_id: UserId,
            memory_id: &str,
            _text: &str,
            fire_at: &str,
        ) -> Result<()> {
            self.reminder_calls.lock().unwrap().push((
                owner_user_id,
                memory_id.to_string(),
                fire_at.to_string(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_parse_user_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 12, 25, 9, 0, 0).unwrap();
        assert_eq!(parse_user_datetime("2026-12-25 09:00"), Some(expected));
        assert_eq!(parse_user_datetime("25/12/2026 09:00"), Some(expected));

        let midnight = Utc.with_ymd_and_hms(2026, 12, 25, 0, 0, 0).unwrap();
        assert_eq!(parse_user_datetime("2026-12-25"), Some(midnight));
        assert_eq!(parse_user_datetime("25/12/2026"), Some(midnight));

        assert_eq!(parse_user_datetime("next tuesday"), None);
        assert_eq!(parse_user_datetime(""), None);
    }

    #[tokio::test]
    async fn test_idle_user_passes_through() {
        let store = PendingActionStore::new();
        let api = StubApi::default();

        let reply = handle_pending_input(&store, &api, 1, "just a note").await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_tags_flow_returns_to_idle() {
        let store = PendingActionStore::new();
        let api = StubApi::default();

        store
            .set(1, PendingAction::AwaitingTags { memory_id: "m1".into() })
            .await;

        let reply = handle_pending_input(&store, &api, 1, " travel, beach ,,").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Tags added: travel, beach"));

        let calls = api.tag_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "m1");
        assert_eq!(calls[0].1, vec!["travel".to_string(), "beach".to_string()]);
        assert_eq!(calls[0].2, "confirmed");
        drop(calls);

        // Back to idle.
        assert!(store.peek(1).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_tags_keep_waiting() {
        let store = PendingActionStore::new();
        let api = StubApi::default();

        store
            .set(2, PendingAction::AwaitingTags { memory_id: "m2".into() })
            .await;

        let reply = handle_pending_input(&store, &api, 2, " , ,").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Please provide at least one tag."));

        // Still awaiting tags.
        assert_eq!(
            store.peek(2).await,
            Some(PendingAction::AwaitingTags { memory_id: "m2".into() })
        );
    }

    #[tokio::test]
    async fn test_tag_failure_keeps_state_for_retry() {
        let store = PendingActionStore::new();
        let api = StubApi {
            fail_tags: true,
            ..Default::default()
        };

        store
            .set(3, PendingAction::AwaitingTags { memory_id: "m3".into() })
            .await;

        let reply = handle_pending_input(&store, &api, 3, "tag").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Failed to add tags. Please try again."));
        assert!(store.peek(3).await.is_some());
    }

    #[tokio::test]
    async fn test_due_date_flow() {
        let store = PendingActionStore::new();
        let api = StubApi::default();

        store
            .set(4, PendingAction::AwaitingDueDate { memory_id: "m4".into() })
            .await;

        // Unparseable input keeps the state.
        let reply = handle_pending_input(&store, &api, 4, "whenever").await.unwrap();
        assert!(reply.unwrap().starts_with("Could not parse the date"));
        assert!(store.peek(4).await.is_some());

        let reply = handle_pending_input(&store, &api, 4, "2026-09-01 08:30").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Task created with due date: 2026-09-01 08:30"));
        assert!(store.peek(4).await.is_none());

        let calls = api.task_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 4);
        assert_eq!(calls[0].2, "2026-09-01T08:30:00.000Z");
    }

    #[tokio::test]
    async fn test_reminder_time_flow() {
        let store = PendingActionStore::new();
        let api = StubApi::default();

        store
            .set(
                5,
                PendingAction::AwaitingReminderTime { memory_id: "m5".into() },
            )
            .await;

        let reply = handle_pending_input(&store, &api, 5, "2026-09-02 07:00").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Reminder set for 2026-09-02 07:00"));

        let calls = api.reminder_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "m5");
        assert_eq!(calls[0].2, "2026-09-02T07:00:00.000Z");
    }
}
