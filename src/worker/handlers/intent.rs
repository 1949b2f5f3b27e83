//! Intent classification for search queries.

use crate::error::Result;
use crate::worker::handlers::{required_str, JobHandler};
use crate::worker::prompts::intent_classify_prompt;
use crate::worker::{extract_json, ChatModel};
use crate::UserId;
use std::sync::Arc;

pub struct IntentHandler {
    llm: Arc<dyn ChatModel>,
    text_model: String,
}

impl IntentHandler {
    pub fn new(llm: Arc<dyn ChatModel>, text_model: &str) -> Self {
        Self {
            llm,
            text_model: text_model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for IntentHandler {
    async fn handle(
        &self,
        _job_id: &str,
        payload: &serde_json::Value,
        _user_id: Option<UserId>,
    ) -> Result<Option<serde_json::Value>> {
        let query = required_str(payload, "query")?;

        let raw = self
            .llm
            .complete(&self.text_model, &intent_classify_prompt(query))
            .await?;
        let parsed = extract_json(&raw)?;

        let intent = parsed["intent"].as_str().unwrap_or("ambiguous");
        tracing::info!(%query, %intent, "classified search intent");

        Ok(Some(serde_json::json!({
            "query": query,
            "intent": intent,
            "results": [],
        })))
    }
}
