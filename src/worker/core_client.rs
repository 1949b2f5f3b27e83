//! HTTP client for the Core REST API, behind a trait so handler and
//! consumer behavior is testable without a server.

use crate::error::{AgentError, Result};
use crate::store::JobStatus;
use crate::UserId;
use serde::Deserialize;

/// An open task as the worker sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTask {
    pub id: String,
    pub description: String,
}

/// The slice of the Core API the worker needs.
#[async_trait::async_trait]
pub trait CoreApi: Send + Sync {
    /// PATCH an LLM job's status/result/error.
    async fn update_job(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<()>;

    /// Current status of a job, or None if unknown to Core.
    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>>;

    /// POST tags onto a memory.
    async fn add_tags(&self, memory_id: &str, tags: &[String], status: &str) -> Result<()>;

    /// POST a pending event.
    async fn create_event(&self, event: serde_json::Value) -> Result<()>;

    /// GET a user's NOT_DONE tasks.
    async fn open_tasks(&self, user_id: UserId) -> Result<Vec<OpenTask>>;
}

pub struct CoreApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoreApiClient {
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
}

async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::CoreApi(format!("{context} returned {status}: {body}")).into())
}

#[async_trait::async_trait]
impl CoreApi for CoreApiClient {
    async fn update_job(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut body = serde_json::json!({"status": status.as_str()});
        if let Some(result) = result {
            body["result"] = result;
        }
        if let Some(error_message) = error_message {
            body["error_message"] = serde_json::Value::String(error_message);
        }

        let url = self.url(&format!("/llm_jobs/{job_id}"));
        let response = self
            .http
            .patch(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("PATCH {url}: {e}")))?;
        check(response, "job update").await?;
        Ok(())
    }

    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        let url = self.url(&format!("/llm_jobs/{job_id}"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("GET {url}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, "job fetch").await?;

        #[derive(Deserialize)]
        struct JobStatusBody {
            status: String,
        }
        let body: JobStatusBody = response
            .json()
            .await
            .map_err(|e| AgentError::CoreApi(format!("decode job: {e}")))?;

        Ok(JobStatus::parse(&body.status))
    }

    async fn add_tags(&self, memory_id: &str, tags: &[String], status: &str) -> Result<()> {
        let url = self.url(&format!("/memories/{memory_id}/tags"));
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({"tags": tags, "status": status}))
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("POST {url}: {e}")))?;
        check(response, "tag add").await?;
        Ok(())
    }

    async fn create_event(&self, event: serde_json::Value) -> Result<()> {
        let url = self.url("/events");
        let response = self
            .http
            .post(&url)
            .json(&event)
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("POST {url}: {e}")))?;
        check(response, "event create").await?;
        Ok(())
    }

    async fn open_tasks(&self, user_id: UserId) -> Result<Vec<OpenTask>> {
        let url = self.url("/tasks");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("owner_user_id", user_id.to_string()),
                ("state", "NOT_DONE".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::CoreApi(format!("GET {url}: {e}")))?;
        let response = check(response, "task list").await?;

        response
            .json()
            .await
            .map_err(|e| AgentError::CoreApi(format!("decode tasks: {e}")).into())
    }
}
