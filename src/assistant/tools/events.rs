//! Event tools for the agent.

use crate::assistant::core_client::AssistantApi;
use crate::assistant::tools::AgentTool;
use crate::error::Result;
use crate::UserId;

pub struct ListEventsTool;

#[async_trait::async_trait]
impl AgentTool for ListEventsTool {
    fn name(&self) -> &'static str {
        "list_events"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "list_events",
                "description": "List the user's calendar events, including pending ones awaiting confirmation.",
                "parameters": {
                    "type": "object",
                    "properties": {}
                }
            }
        })
    }

    async fn call(
        &self,
        api: &dyn AssistantApi,
        user_id: UserId,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        api.list_events(user_id).await
    }
}
