//! Image tagging: vision model suggests tags for a media memory.

use crate::error::Result;
use crate::worker::handlers::{required_str, JobHandler};
use crate::worker::prompts::IMAGE_TAG_PROMPT;
use crate::worker::{extract_json, ChatModel, CoreApi};
use crate::UserId;
use base64::Engine as _;
use std::sync::Arc;

pub struct ImageTagHandler {
    llm: Arc<dyn ChatModel>,
    core: Arc<dyn CoreApi>,
    vision_model: String,
}

impl ImageTagHandler {
    pub fn new(llm: Arc<dyn ChatModel>, core: Arc<dyn CoreApi>, vision_model: &str) -> Self {
        Self {
            llm,
            core,
            vision_model: vision_model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for ImageTagHandler {
    async fn handle(
        &self,
        _job_id: &str,
        payload: &serde_json::Value,
        _user_id: Option<UserId>,
    ) -> Result<Option<serde_json::Value>> {
        let memory_id = required_str(payload, "memory_id")?;
        let image_path = required_str(payload, "image_path")?;

        let image_bytes = tokio::fs::read(image_path).await?;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);

        let raw = self
            .llm
            .complete_with_image(&self.vision_model, IMAGE_TAG_PROMPT, &image_b64)
            .await?;

        let parsed = extract_json(&raw)?;
        let tags: Vec<String> = parsed["tags"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let description = parsed["description"].as_str().unwrap_or_default().to_string();

        if !tags.is_empty() {
            self.core.add_tags(memory_id, &tags, "suggested").await?;
        }

        tracing::info!(%memory_id, tag_count = tags.len(), "suggested image tags");

        Ok(Some(serde_json::json!({
            "memory_id": memory_id,
            "tags": tags,
            "description": description,
        })))
    }
}
