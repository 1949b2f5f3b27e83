//! HTTP client for the Core REST API as the gateway consumes it.

use crate::error::{AgentError, Result};
use crate::UserId;

/// The slice of the Core API the gateway's callback flows need.
#[async_trait::async_trait]
pub trait GatewayApi: Send + Sync {
    async fn add_tags(&self, memory_id: &str, tags: &[String], status: &str) -> Result<()>;
    async fn create_task(
        &self,
        owner_user_id: UserId,
        memory_id: &str,
        description: &str,
        due_at: &str,
    ) -> Result<()>;
    async fn create_reminder(
        &self,
        owner_user_id: UserId,
        memory_id: &str,
        text: &str,
        fire_at: &str,
    ) -> Result<()>;
}

pub struct GatewayCoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayCoreClient {
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

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
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
        Ok(())
    }
}

#[async_trait::async_trait]
impl GatewayApi for GatewayCoreClient {
    async fn add_tags(&self, memory_id: &str, tags: &[String], status: &str) -> Result<()> {
        self.post(
            &format!("/memories/{memory_id}/tags"),
            serde_json::json!({"tags": tags, "status": status}),
        )
        .await
    }

    async fn create_task(
        &self,
        owner_user_id: UserId,
        memory_id: &str,
        description: &str,
        due_at: &str,
    ) -> Result<()> {
        self.post(
            "/tasks",
            serde_json::json!({
                "owner_user_id": owner_user_id,
                "memory_id": memory_id,
                "description": description,
                "due_at": due_at,
            }),
        )
        .await
    }

    async fn create_reminder(
        &self,
        owner_user_id: UserId,
        memory_id: &str,
        text: &str,
        fire_at: &str,
    ) -> Result<()> {
        self.post(
            "/reminders",
            serde_json::json!({
                "owner_user_id": owner_user_id,
                "memory_id": memory_id,
                "text": text,
                "fire_at": fire_at,
            }),
        )
        .await
    }
}
