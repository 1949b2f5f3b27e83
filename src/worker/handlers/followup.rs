//! Follow-up question generation for thin search results.

use crate::error::Result;
use crate::worker::handlers::JobHandler;
use crate::worker::prompts::followup_prompt;
use crate::worker::ChatModel;
use crate::UserId;
use std::sync::Arc;

pub struct FollowupHandler {
    llm: Arc<dyn ChatModel>,
    text_model: String,
}

impl FollowupHandler {
    pub fn new(llm: Arc<dyn ChatModel>, text_model: &str) -> Self {
        Self {
            llm,
            text_model: text_model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for FollowupHandler {
    async fn handle(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
        _user_id: Option<UserId>,
    ) -> Result<Option<serde_json::Value>> {
        let Some(message) = payload.get("message").and_then(|v| v.as_str()) else {
            tracing::error!(%job_id, "followup job missing 'message' in payload");
            return Ok(None);
        };

        let context = payload
            .get("context")
            .or_else(|| payload.get("followup_context"))
            .and_then(|v| v.as_str())
            .unwrap_or("No additional context available.");

        let raw = self
            .llm
            .complete(&self.text_model, &followup_prompt(message, context))
            .await?;

        let question = raw.trim().to_string();
        tracing::info!(question = %question.chars().take(80).collect::<String>(), "generated followup");

        Ok(Some(serde_json::json!({"question": question})))
    }
}
