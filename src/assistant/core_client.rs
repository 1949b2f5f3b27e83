//! HTTP client for the Core REST API as the assistant consumes it.

use crate::error::{AgentError, Result};
use crate::UserId;
use serde::Deserialize;

/// A task as the briefing and tools see it.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub description: String,
    pub state: String,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub memory_id: Option<String>,
}

/// A reminder as the briefing and tools see it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderItem {
    pub id: String,
    pub text: String,
    pub fire_at: String,
    #[serde(default)]
    pub fired: bool,
    #[serde(default)]
    pub memory_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsItem {
    pub timezone: String,
    pub language: String,
}

/// The slice of the Core API the assistant needs.
#[async_trait::async_trait]
pub trait AssistantApi: Send + Sync {
    async fn search_memories(&self, owner_user_id: UserId, query: &str)
        -> Result<serde_json::Value>;
    async fn get_memory(&self, memory_id: &str) -> Result<Option<serde_json::Value>>;

    async fn list_tasks(&self, owner_user_id: UserId, state: Option<&str>)
        -> Result<Vec<TaskItem>>;
    async fn create_task(
        &self,
        owner_user_id: UserId,
        memory_id: Option<&str>,
        description: &str,
        due_at: Option<&str>,
    ) -> Result<serde_json::Value>;

    async fn list_reminders(&self, owner_user_id: UserId, upcoming_only: bool)
        -> Result<Vec<ReminderItem>>;
    async fn create_reminder(
        &self,
        owner_user_id: UserId,
        memory_id: Option<&str>,
        text: &str,
        fire_at: &str,
    ) -> Result<serde_json::Value>;

    async fn list_events(&self, owner_user_id: UserId) -> Result<serde_json::Value>;

    async fn get_settings(&self, user_id: UserId) -> Result<Option<SettingsItem>>;
}

pub struct AssistantCoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl AssistantCoreClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::CoreApi(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json(&self, url: String, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::CoreApi(format!("GET {url} returned {status}: {body}")).into());
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::CoreApi(format!("decode {url}: {e}")).into())
    }

    async fn post_json(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::CoreApi(format!("POST {url} returned {status}: {body}")).into());
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::CoreApi(format!("decode {url}: {e}")).into())
    }
}

#[async_trait::async_trait]
impl AssistantApi for AssistantCoreClient {
    async fn search_memories(
        &self,
        owner_user_id: UserId,
        query: &str,
    ) -> Result<serde_json::Value> {
        self.get_json(
            self.url("/search"),
            &[
                ("q", query.to_string()),
                ("owner", owner_user_id.to_string()),
            ],
        )
        .await
    }

    async fn get_memory(&self, memory_id: &str) -> Result<Option<serde_json::Value>> {
        let url = self.url(&format!("/memories/{memory_id}"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("GET {url}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::CoreApi(format!("GET {url} returned {status}: {body}")).into());
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| AgentError::CoreApi(format!("decode {url}: {e}")).into())
    }

    async fn list_tasks(
        &self,
        owner_user_id: UserId,
        state: Option<&str>,
    ) -> Result<Vec<TaskItem>> {
        let mut query = vec![("owner_user_id", owner_user_id.to_string())];
        if let Some(state) = state {
            query.push(("state", state.to_string()));
        }

        let value = self.get_json(self.url("/tasks"), &query).await?;
        serde_json::from_value(value)
            .map_err(|e| AgentError::CoreApi(format!("decode tasks: {e}")).into())
    }

    async fn create_task(
        &self,
        owner_user_id: UserId,
        memory_id: Option<&str>,
        description: &str,
        due_at: Option<&str>,
    ) -> Result<serde_json::Value> {
        self.post_json(
            self.url("/tasks"),
            serde_json::json!({
                "owner_user_id": owner_user_id,
                "memory_id": memory_id,
                "description": description,
                "due_at": due_at,
            }),
        )
        .await
    }

    async fn list_reminders(
        &self,
        owner_user_id: UserId,
        upcoming_only: bool,
    ) -> Result<Vec<ReminderItem>> {
        let mut query = vec![("owner_user_id", owner_user_id.to_string())];
        if upcoming_only {
            query.push(("upcoming_only", "true".to_string()));
        }

        let value = self.get_json(self.url("/reminders"), &query).await?;
        serde_json::from_value(value)
            .map_err(|e| AgentError::CoreApi(format!("decode reminders: {e}")).into())
    }

    async fn create_reminder(
        &self,
        owner_user_id: UserId,
        memory_id: Option<&str>,
        text: &str,
        fire_at: &str,
    ) -> Result<serde_json::Value> {
        self.post_json(
            self.url("/reminders"),
            serde_json::json!({
                "owner_user_id": owner_user_id,
                "memory_id": memory_id,
                "text": text,
                "fire_at": fire_at,
            }),
        )
        .await
    }

    async fn list_events(&self, owner_user_id: UserId) -> Result<serde_json::Value> {
        self.get_json(
            self.url("/events"),
            &[("owner_user_id", owner_user_id.to_string())],
        )
        .await
    }

    async fn get_settings(&self, user_id: UserId) -> Result<Option<SettingsItem>> {
        let url = self.url(&format!("/settings/{user_id}"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("GET {url}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::CoreApi(format!("GET {url} returned {status}: {body}")).into());
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| AgentError::CoreApi(format!("decode {url}: {e}")).into())
    }
}
