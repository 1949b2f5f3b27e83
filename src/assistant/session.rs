//! Per-user session state in the broker's TTL key space.
//!
//! Chat history lives 24 hours (refreshed on save), the session summary
//! seven days, and the per-day digest marker 48 hours (wide enough to
//! span DST transitions).

use crate::assistant::model::ChatMessage;
use crate::error::{AgentError, Result, StreamError};
use crate::UserId;
use redis::aio::ConnectionManager;
use redis::AsyncCommands as _;

pub const HISTORY_TTL_SECS: u64 = 86_400;
pub const SUMMARY_TTL_SECS: u64 = 604_800;
pub const DIGEST_MARKER_TTL_SECS: u64 = 172_800;

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_history(&self, user_id: UserId) -> Result<Vec<ChatMessage>>;
    async fn save_history(&self, user_id: UserId, messages: &[ChatMessage]) -> Result<()>;

    async fn load_summary(&self, user_id: UserId) -> Result<Option<String>>;
    async fn save_summary(&self, user_id: UserId, summary: &str) -> Result<()>;

    /// True if the digest for this (user, local date) was already sent.
    async fn digest_sent(&self, user_id: UserId, date: &str) -> Result<bool>;
    async fn mark_digest_sent(&self, user_id: UserId, date: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(StreamError::Redis)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(StreamError::Redis)?;
        Ok(Self { conn })
    }

    fn history_key(user_id: UserId) -> String {
        format!("assistant:chat:{user_id}")
    }

    fn summary_key(user_id: UserId) -> String {
        format!("assistant:summary:{user_id}")
    }

    fn digest_key(user_id: UserId, date: &str) -> String {
        format!("assistant:digest_sent:{user_id}:{date}")
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn load_history(&self, user_id: UserId) -> Result<Vec<ChatMessage>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::history_key(user_id))
            .await
            .map_err(StreamError::Redis)?;

        match raw {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AgentError::Session(format!("corrupt chat history: {e}")).into()),
        }
    }

    async fn save_history(&self, user_id: UserId, messages: &[ChatMessage]) -> Result<()> {
        let json = serde_json::to_string(messages)
            .map_err(|e| AgentError::Session(format!("serialize history: {e}")))?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::history_key(user_id), json, HISTORY_TTL_SECS)
            .await
            .map_err(StreamError::Redis)?;
        Ok(())
    }

    async fn load_summary(&self, user_id: UserId) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::summary_key(user_id))
            .await
            .map_err(StreamError::Redis)?;
        Ok(raw)
    }

    async fn save_summary(&self, user_id: UserId, summary: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::summary_key(user_id), summary, SUMMARY_TTL_SECS)
            .await
            .map_err(StreamError::Redis)?;
        Ok(())
    }

    async fn digest_sent(&self, user_id: UserId, date: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::digest_key(user_id, date))
            .await
            .map_err(StreamError::Redis)?;
        Ok(raw.is_some())
    }

    async fn mark_digest_sent(&self, user_id: UserId, date: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::digest_key(user_id, date), "1", DIGEST_MARKER_TTL_SECS)
            .await
            .map_err(StreamError::Redis)?;
        Ok(())
    }
}

/// In-memory session store for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemorySessionStore {
        pub histories: Mutex<HashMap<UserId, Vec<ChatMessage>>>,
        pub summaries: Mutex<HashMap<UserId, String>>,
        pub digest_markers: Mutex<HashSet<(UserId, String)>>,
    }

    #[async_trait::async_trait]
    impl SessionStore for MemorySessionStore {
        async fn load_history(&self, user_id: UserId) -> Result<Vec<ChatMessage>> {
            Ok(self
                .histories
                .lock()
                .unwrap()
                .get(&user_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn save_history(&self, user_id: UserId, messages: &[ChatMessage]) -> Result<()> {
            self.histories
                .lock()
                .unwrap()
                .insert(user_id, messages.to_vec());
            Ok(())
        }

        async fn load_summary(&self, user_id: UserId) -> Result<Option<String>> {
            Ok(self.summaries.lock().unwrap().get(&user_id).cloned())
        }

        async fn save_summary(&self, user_id: UserId, summary: &str) -> Result<()> {
            self.summaries
                .lock()
                .unwrap()
                .insert(user_id, summary.to_string());
            Ok(())
        }

        async fn digest_sent(&self, user_id: UserId, date: &str) -> Result<bool> {
            Ok(self
                .digest_markers
                .lock()
                .unwrap()
                .contains(&(user_id, date.to_string())))
        }

        async fn mark_digest_sent(&self, user_id: UserId, date: &str) -> Result<()> {
            self.digest_markers
                .lock()
                .unwrap()
                .insert((user_id, date.to_string()));
            Ok(())
        }
    }
}
