//! Daily digest: a morning briefing per user, sent once per local day.
//!
//! The loop ticks every 15 minutes and compares each user's local hour
//! (the one place besides gateway display formatting that knows about
//! user time zones) against the configured digest hour. The per-user
//! per-day marker has a 48 h TTL, wide enough to span DST transitions.

use crate::assistant::briefing::BriefingBuilder;
use crate::assistant::context::TokenCounter;
use crate::assistant::core_client::AssistantApi;
use crate::assistant::session::SessionStore;
use crate::error::Result;
use crate::gateway::ChatInterface;
use crate::UserId;
use chrono::{DateTime, Timelike as _, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::Duration;

const TICK_SECS: u64 = 15 * 60;

/// True when `now` falls in the user's digest hour for their time zone.
/// An unknown time zone falls back to UTC.
pub fn digest_due(now: DateTime<Utc>, timezone: &str, digest_hour: u32) -> bool {
    let local_hour = match timezone.parse::<Tz>() {
        Ok(tz) => now.with_timezone(&tz).hour(),
        Err(_) => {
            tracing::warn!(%timezone, "unknown timezone, using UTC for digest check");
            now.hour()
        }
    };
    local_hour == digest_hour
}

pub struct DigestScheduler {
    api: Arc<dyn AssistantApi>,
    sessions: Arc<dyn SessionStore>,
    briefing: Arc<BriefingBuilder>,
    interface: Arc<dyn ChatInterface>,
    counter: TokenCounter,
    user_ids: Vec<UserId>,
    digest_hour: u32,
}

impl DigestScheduler {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        sessions: Arc<dyn SessionStore>,
        briefing: Arc<BriefingBuilder>,
        interface: Arc<dyn ChatInterface>,
        counter: TokenCounter,
        user_ids: Vec<UserId>,
        digest_hour: u32,
    ) -> Self {
        Self {
            api,
            sessions,
            briefing,
            interface,
            counter,
            user_ids,
            digest_hour,
        }
    }

    /// Send a digest to one user unless today's marker is already set.
    pub async fn send_digest_for_user(&self, user_id: UserId) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        if self.sessions.digest_sent(user_id, &today).await? {
            return Ok(());
        }

        let briefing = self.briefing.build(user_id, &self.counter).await;
        if briefing.trim().is_empty() {
            return Ok(());
        }

        self.interface
            .send_message(
                user_id,
                &format!("Good morning! Here's your daily briefing:\n\n{briefing}"),
            )
            .await?;

        self.sessions.mark_digest_sent(user_id, &today).await?;
        tracing::info!(%user_id, "daily digest sent");
        Ok(())
    }

    /// Check every allowed user and send digests where the local hour
    /// matches.
    pub async fn check_and_send_all(&self) {
        let now = Utc::now();

        for &user_id in &self.user_ids {
            let timezone = match self.api.get_settings(user_id).await {
                Ok(Some(settings)) => settings.timezone,
                Ok(None) => "UTC".to_string(),
                Err(error) => {
                    tracing::error!(%user_id, %error, "failed to fetch settings for digest");
                    continue;
                }
            };

            if !digest_due(now, &timezone, self.digest_hour) {
                continue;
            }

            if let Err(error) = self.send_digest_for_user(user_id).await {
                tracing::error!(%user_id, %error, "failed to send digest");
            }
        }
    }

    /// Run the digest loop until shutdown.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        tracing::info!(digest_hour = self.digest_hour, users = self.user_ids.len(), "digest scheduler started");

        let mut ticker = tokio::time::interval(Duration::from_secs(TICK_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_and_send_all().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("digest scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::core_client::{ReminderItem, SettingsItem, TaskItem};
    use crate::assistant::session::testing::MemorySessionStore;
    use chrono::TimeZone as _;
    use std::sync::Mutex;

    #[test]
    fn test_digest_due_respects_timezone() {
        // 08:00 in Berlin is 06:00 UTC during summer time.
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 6, 30, 0).unwrap();

        assert!(digest_due(now, "Europe/Berlin", 8));
        assert!(!digest_due(now, "UTC", 8));
        assert!(digest_due(now, "UTC", 6));
        // Unknown zones fall back to UTC rather than skipping the user.
        assert!(digest_due(now, "Mars/Olympus", 6));
    }

    struct StubApi {
        tasks: Vec<TaskItem>,
        timezone: String,
    }

    #[async_trait::async_trait]
    impl AssistantApi for StubApi {
        async fn search_memories(&self, _o: UserId, _q: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!([]))
        }
        async fn get_memory(&self, _id: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn list_tasks(&self, _o: UserId, _s: Option<&str>) -> Result<Vec<TaskItem>> {
            Ok(self.tasks.clone())
        }
        async fn create_task(
            &self,
            _o: UserId,
            _m: Option<&str>,
            _d: &str,
            _due: Option<&str>,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
        async fn list_reminders(&self, _o: UserId, _u: bool) -> Result<Vec<ReminderItem>> {
            Ok(Vec::new())
        }
        async fn create_reminder(
            &self,
            _o: UserId,
            _m: Option<&str>,
            _t: &str,
            _f: &str,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
        async fn list_events(&self, _o: UserId) -> Result<serde_json::Value> {
            Ok(serde_json::json!([]))
        }
        async fn get_settings(&self, _u: UserId) -> Result<Option<SettingsItem>> {
            Ok(Some(SettingsItem {
                timezone: self.timezone.clone(),
                language: "en".into(),
            }))
        }
    }

    #[derive(Default)]
    struct RecordingInterface {
        sent: Mutex<Vec<(UserId, String)>>,
    }

    #[async_trait::async_trait]
    impl ChatInterface for RecordingInterface {
        async fn send_message(&self, user_id: UserId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((user_id, text.to_string()));
            Ok(())
        }
    }

    fn scheduler(
        interface: Arc<RecordingInterface>,
        sessions: Arc<MemorySessionStore>,
    ) -> DigestScheduler {
        let api: Arc<dyn AssistantApi> = Arc::new(StubApi {
            tasks: vec![TaskItem {
                id: "t1".into(),
                description: "pack bags".into(),
                state: "NOT_DONE".into(),
                due_at: None,
                memory_id: None,
            }],
            timezone: "UTC".into(),
        });
        let briefing = Arc::new(BriefingBuilder::new(api.clone(), sessions.clone(), 500));

        DigestScheduler::new(
            api,
            sessions,
            briefing,
            interface,
            TokenCounter::for_model("gpt-4o"),
            vec![42],
            8,
        )
    }

    #[tokio::test]
    async fn test_digest_sent_once_per_day() {
        let interface = Arc::new(RecordingInterface::default());
        let sessions = Arc::new(MemorySessionStore::default());
        let digest = scheduler(interface.clone(), sessions.clone());

        digest.send_digest_for_user(42).await.unwrap();
        digest.send_digest_for_user(42).await.unwrap();

        let sent = interface.sent.lock().unwrap();
        assert_eq!(sent.len(), 1, "marker suppresses the second send");
        assert!(sent[0].1.starts_with("Good morning!"));
        assert!(sent[0].1.contains("pack bags"));
        drop(sent);

        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert!(sessions.digest_sent(42, &today).await.unwrap());
    }
}
