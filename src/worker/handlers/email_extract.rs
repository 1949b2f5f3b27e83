//! Email event extraction: pending events from forwarded email text.

use crate::error::Result;
use crate::worker::handlers::{required_str, JobHandler, CONFIDENCE_THRESHOLD};
use crate::worker::prompts::email_extract_prompt;
use crate::worker::{extract_json, ChatModel, CoreApi};
use crate::UserId;
use std::sync::Arc;

pub struct EmailExtractHandler {
    llm: Arc<dyn ChatModel>,
    core: Arc<dyn CoreApi>,
    text_model: String,
}

impl EmailExtractHandler {
    pub fn new(llm: Arc<dyn ChatModel>, core: Arc<dyn CoreApi>, text_model: &str) -> Self {
        Self {
            llm,
            core,
            text_model: text_model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for EmailExtractHandler {
    async fn handle(
        &self,
        _job_id: &str,
        payload: &serde_json::Value,
        user_id: Option<UserId>,
    ) -> Result<Option<serde_json::Value>> {
        let subject = required_str(payload, "subject")?;
        let body = required_str(payload, "body")?;

        let raw = self
            .llm
            .complete(&self.text_model, &email_extract_prompt(subject, body))
            .await?;
        let parsed = extract_json(&raw)?;

        let events = parsed["events"].as_array().cloned().unwrap_or_default();

        let mut first_notification = None;
        let mut created = 0usize;
        for event in &events {
            let confidence = event["confidence"].as_f64().unwrap_or(0.0);
            if confidence <= CONFIDENCE_THRESHOLD {
                continue;
            }
            let (Some(description), Some(event_time)) =
                (event["description"].as_str(), event["event_time"].as_str())
            else {
                continue;
            };

            self.core
                .create_event(serde_json::json!({
                    "owner_user_id": user_id,
                    "event_time": event_time,
                    "description": description,
                    "source_type": "email",
                    "source_detail": subject,
                }))
                .await?;
            created += 1;

            if first_notification.is_none() {
                first_notification = Some(serde_json::json!({
                    "description": description,
                    "event_date": event_time,
                }));
            }
        }

        let subject_preview: String = subject.chars().take(50).collect();
        if created > 0 {
            tracing::info!(created, subject = %subject_preview, "extracted events from email");
        } else {
            tracing::info!(subject = %subject_preview, "no high-confidence events in email");
        }

        Ok(first_notification)
    }
}
