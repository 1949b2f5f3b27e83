//! Reminder tools for the agent.

use crate::assistant::core_client::AssistantApi;
use crate::assistant::tools::{arg_str, AgentTool};
use crate::error::Result;
use crate::UserId;

pub struct ListRemindersTool;

#[async_trait::async_trait]
impl AgentTool for ListRemindersTool {
    fn name(&self) -> &'static str {
        "list_reminders"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "list_reminders",
                "description": "List the user's upcoming reminders.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "include_fired": {
                            "type": "boolean",
                            "description": "Include reminders that already fired. Defaults to false."
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
        let include_fired = args
            .get("include_fired")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let reminders = api.list_reminders(user_id, !include_fired).await?;

        Ok(serde_json::json!(reminders
            .iter()
            .map(|r| serde_json::json!({
                "id": r.id,
                "text": r.text,
                "fire_at": r.fire_at,
                "fired": r.fired,
                "memory_id": r.memory_id,
            }))
            .collect::<Vec<_>>()))
    }
}

pub struct CreateReminderTool;

#[async_trait::async_trait]
impl AgentTool for CreateReminderTool {
    fn name(&self) -> &'static str {
        "create_reminder"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "create_reminder",
                "description": "Create a reminder that fires at a specific time. Always confirm with the user before calling this.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "What to remind the user about"
                        },
                        "fire_at": {
                            "type": "string",
                            "description": "When the reminder should fire, in ISO 8601 format (e.g. 2026-03-01T10:00:00Z)"
                        },
                        "memory_id": {
                            "type": "string",
                            "description": "Optional memory ID to link this reminder to"
                        }
                    },
                    "required": ["text", "fire_at"]
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
        let text = arg_str(&args, "text").unwrap_or_default();
        let fire_at = arg_str(&args, "fire_at").unwrap_or_default();
        let memory_id = arg_str(&args, "memory_id");

        api.create_reminder(user_id, memory_id.as_deref(), &text, &fire_at)
            .await
    }
}
