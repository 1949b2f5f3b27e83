//! Task tools for the agent.

use crate::assistant::core_client::AssistantApi;
use crate::assistant::tools::{arg_str, AgentTool};
use crate::error::Result;
use crate::UserId;

pub struct ListTasksTool;

#[async_trait::async_trait]
impl AgentTool for ListTasksTool {
    fn name(&self) -> &'static str {
        "list_tasks"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "list_tasks",
                "description": "List the user's tasks, optionally filtered by state (NOT_DONE or DONE).",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "state": {
                            "type": "string",
                            "enum": ["NOT_DONE", "DONE"],
                            "description": "Filter by task state. If omitted, returns all tasks."
                        }
                    }
                }
            }
        })
    }

    async fn call(
        &self,
        api: &dyn AssistantApi,
        user_id: UserId,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let state = arg_str(&args, "state");
        let tasks = api.list_tasks(user_id, state.as_deref()).await?;

        Ok(serde_json::json!(tasks
            .iter()
            .map(|t| serde_json::json!({
                "id": t.id,
                "description": t.description,
                "state": t.state,
                "due_at": t.due_at,
                "memory_id": t.memory_id,
            }))
            .collect::<Vec<_>>()))
    }
}

pub struct CreateTaskTool;

#[async_trait::async_trait]
impl AgentTool for CreateTaskTool {
    fn name(&self) -> &'static str {
        "create_task"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "create_task",
                "description": "Create a new task, optionally linked to a memory. Always confirm with the user before calling this.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "description": {
                            "type": "string",
                            "description": "What the task is"
                        },
                        "memory_id": {
                            "type": "string",
                            "description": "Optional memory ID to link this task to"
                        },
                        "due_at": {
                            "type": "string",
                            "description": "Optional due date in ISO 8601 format (e.g. 2026-03-01T10:00:00Z)"
                        }
                    },
                    "required": ["description"]
                }
            }
        })
    }

    async fn call(
        &self,
        api: &dyn AssistantApi,
        user_id: UserId,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let description = arg_str(&args, "description").unwrap_or_default();
        let memory_id = arg_str(&args, "memory_id");
        let due_at = arg_str(&args, "due_at");

        api.create_task(user_id, memory_id.as_deref(), &description, due_at.as_deref())
            .await
    }
}
