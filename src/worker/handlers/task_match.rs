//! Task matching: does a newly saved memory complete an open task?

use crate::error::Result;
use crate::worker::handlers::{required_str, JobHandler, CONFIDENCE_THRESHOLD};
use crate::worker::prompts::task_match_prompt;
use crate::worker::{extract_json, ChatModel, CoreApi};
use crate::UserId;
use std::sync::Arc;

pub struct TaskMatchHandler {
    llm: Arc<dyn ChatModel>,
    core: Arc<dyn CoreApi>,
    text_model: String,
}

impl TaskMatchHandler {
    pub fn new(llm: Arc<dyn ChatModel>, core: Arc<dyn CoreApi>, text_model: &str) -> Self {
        Self {
            llm,
            core,
            text_model: text_model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for TaskMatchHandler {
    async fn handle(
        &self,
        _job_id: &str,
        payload: &serde_json::Value,
        user_id: Option<UserId>,
    ) -> Result<Option<serde_json::Value>> {
        let memory_id = required_str(payload, "memory_id")?;
        let memory_content = required_str(payload, "memory_content")?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let tasks = self.core.open_tasks(user_id).await?;
        if tasks.is_empty() {
            tracing::info!(%user_id, "no open tasks, skipping match");
            return Ok(None);
        }

        let tasks_list = tasks
            .iter()
            .map(|t| format!("- ID: {}, Description: {}", t.id, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let raw = self
            .llm
            .complete(&self.text_model, &task_match_prompt(memory_content, &tasks_list))
            .await?;
        let parsed = extract_json(&raw)?;

        let matched_id = parsed["matched_task_id"].as_str();
        let confidence = parsed["confidence"].as_f64().unwrap_or(0.0);

        let Some(matched_id) = matched_id.filter(|_| confidence > CONFIDENCE_THRESHOLD) else {
            tracing::info!(%memory_id, confidence, "no confident task match");
            return Ok(None);
        };

        let task_description = tasks
            .iter()
            .find(|t| t.id == matched_id)
            .map(|t| t.description.clone())
            .unwrap_or_default();

        tracing::info!(%memory_id, task_id = %matched_id, confidence, "matched memory to task");

        Ok(Some(serde_json::json!({
            "task_id": matched_id,
            "task_description": task_description,
            "memory_id": memory_id,
        })))
    }
}
