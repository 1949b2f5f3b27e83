//! Client for an OpenAI-compatible chat-completions endpoint.

use crate::error::{LlmError, Result};
use serde::Deserialize;

/// Model seam for job handlers. The production impl talks HTTP; tests
/// script replies.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Text completion: one user prompt in, assistant text out.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;

    /// Vision completion with a base64-encoded image.
    async fn complete_with_image(&self, model: &str, prompt: &str, image_b64: &str)
        -> Result<String>;
}

pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn chat(&self, body: serde_json::Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Request(format!("decode completion: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.chat(serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.3,
        }))
        .await
    }

    async fn complete_with_image(
        &self,
        model: &str,
        prompt: &str,
        image_b64: &str,
    ) -> Result<String> {
        self.chat(serde_json::json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:image/jpeg;base64,{image_b64}")},
                    },
                ],
            }],
            "temperature": 0.3,
        }))
        .await
    }
}
