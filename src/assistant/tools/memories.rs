//! Memory tools for the agent.

use crate::assistant::core_client::AssistantApi;
use crate::assistant::tools::{arg_str, AgentTool};
use crate::error::Result;
use crate::UserId;

pub struct SearchMemoriesTool;

#[async_trait::async_trait]
impl AgentTool for SearchMemoriesTool {
    fn name(&self) -> &'static str {
        "search_memories"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "search_memories",
                "description": "Search the user's memories using full-text search. Returns matching memories with their tags and relevance scores.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to find relevant memories"
                        }
                    },
                    "required": ["query"]
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
        let query = arg_str(&args, "query").unwrap_or_default();
        api.search_memories(user_id, &query).await
    }
}

pub struct GetMemoryTool;

#[async_trait::async_trait]
impl AgentTool for GetMemoryTool {
    fn name(&self) -> &'static str {
        "get_memory"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "get_memory",
                "description": "Get full details of a specific memory by its ID, including all tags.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "memory_id": {
                            "type": "string",
                            "description": "The ID of the memory to retrieve"
                        }
                    },
                    "required": ["memory_id"]
                }
            }
        })
    }

    async fn call(
        &self,
        api: &dyn AssistantApi,
        _user_id: UserId,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let memory_id = arg_str(&args, "memory_id").unwrap_or_default();
        match api.get_memory(&memory_id).await? {
            Some(memory) => Ok(memory),
            None => Ok(serde_json::json!({"error": "Memory not found"})),
        }
    }
}
