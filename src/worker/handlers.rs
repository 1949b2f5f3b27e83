//! Job handlers, one per job type.
//!
//! A handler consumes a job payload plus the owner id and returns optional
//! notification content. Returning `Ok(None)` completes the job silently;
//! an error feeds the retry tracker.

pub mod email_extract;
pub mod followup;
pub mod image_tag;
pub mod intent;
pub mod task_match;

use crate::error::Result;
use crate::worker::{ChatModel, CoreApi};
use crate::UserId;
use std::collections::HashMap;
use std::sync::Arc;

pub use email_extract::EmailExtractHandler;
pub use followup::FollowupHandler;
pub use image_tag::ImageTagHandler;
pub use intent::IntentHandler;
pub use task_match::TaskMatchHandler;

/// Confidence gate shared by the task-match and email-extract handlers.
pub(crate) const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
        user_id: Option<UserId>,
    ) -> Result<Option<serde_json::Value>>;
}

/// The standard handler registry, keyed by job type string.
pub fn default_handlers(
    llm: Arc<dyn ChatModel>,
    core: Arc<dyn CoreApi>,
    text_model: &str,
    vision_model: &str,
) -> HashMap<String, Arc<dyn JobHandler>> {
    let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();

    handlers.insert(
        "image_tag".into(),
        Arc::new(ImageTagHandler::new(llm.clone(), core.clone(), vision_model)),
    );
    handlers.insert(
        "intent_classify".into(),
        Arc::new(IntentHandler::new(llm.clone(), text_model)),
    );
    handlers.insert(
        "followup".into(),
        Arc::new(FollowupHandler::new(llm.clone(), text_model)),
    );
    handlers.insert(
        "task_match".into(),
        Arc::new(TaskMatchHandler::new(llm.clone(), core.clone(), text_model)),
    );
    handlers.insert(
        "email_extract".into(),
        Arc::new(EmailExtractHandler::new(llm, core, text_model)),
    );

    handlers
}

/// Pull a required string field out of a payload.
pub(crate) fn required_str<'a>(
    payload: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("payload missing required field {field:?}").into())
}
