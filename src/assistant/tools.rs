//! Tool registry for the agent loop.
//!
//! Schemas are plain JSON values in the chat-completions function format.
//! The session's user id is injected by the registry so the model can
//! never act on someone else's data.

pub mod events;
pub mod memories;
pub mod reminders;
pub mod tasks;

use crate::assistant::core_client::AssistantApi;
use crate::error::{AgentError, Result};
use crate::UserId;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Chat-completions tool schema (`{"type": "function", ...}`).
    fn schema(&self) -> serde_json::Value;

    async fn call(
        &self,
        api: &dyn AssistantApi,
        user_id: UserId,
        args: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The full tool set the assistant ships with.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(memories::SearchMemoriesTool));
        registry.register(Arc::new(memories::GetMemoryTool));
        registry.register(Arc::new(tasks::ListTasksTool));
        registry.register(Arc::new(tasks::CreateTaskTool));
        registry.register(Arc::new(reminders::ListRemindersTool));
        registry.register(Arc::new(reminders::CreateReminderTool));
        registry.register(Arc::new(events::ListEventsTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub async fn execute(
        &self,
        api: &dyn AssistantApi,
        user_id: UserId,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        tool.call(api, user_id, args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional string argument helper shared by the tool impls.
pub(crate) fn arg_str(args: &serde_json::Value, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(str::to_string)
}
