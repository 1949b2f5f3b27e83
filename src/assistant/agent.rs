//! The conversational agent: briefing-aware system prompt, history
//! summarization, and the bounded tool-calling loop.

use crate::assistant::briefing::BriefingBuilder;
use crate::assistant::context::ContextManager;
use crate::assistant::core_client::AssistantApi;
use crate::assistant::model::{AssistantModel, ChatMessage};
use crate::assistant::session::SessionStore;
use crate::assistant::tools::ToolRegistry;
use crate::error::Result;
use crate::UserId;
use std::sync::Arc;

pub const MAX_TOOL_ITERATIONS: usize = 10;

const FALLBACK_REPLY: &str =
    "I'm having trouble processing your request. Could you try rephrasing?";

const SUMMARY_PREFIX: &str = "Summary of earlier conversation: ";

/// Render the system prompt with the briefing interpolated.
pub(crate) fn render_system_prompt(briefing: &str) -> String {
    format!(
        r#"You are a personal assistant with access to the user's memories, tasks, reminders, and events.

You help the user by:
- Answering questions about their stored memories
- Finding relevant information from their data
- Creating tasks and reminders when asked (always confirm before writing)
- Providing proactive suggestions based on their context

For write operations (creating tasks, reminders), ALWAYS ask the user to confirm before executing.

## Current Context
{briefing}
"#
    )
}

fn summarize_prompt(conversation: &str) -> String {
    format!(
        "Summarize this conversation concisely, preserving key facts, decisions, and context that would be useful for continuing the conversation:\n\n{conversation}"
    )
}

pub struct Agent {
    model: Arc<dyn AssistantModel>,
    api: Arc<dyn AssistantApi>,
    sessions: Arc<dyn SessionStore>,
    context: ContextManager,
    briefing: Arc<BriefingBuilder>,
    tools: ToolRegistry,
}

impl Agent {
    pub fn new(
        model: Arc<dyn AssistantModel>,
        api: Arc<dyn AssistantApi>,
        sessions: Arc<dyn SessionStore>,
        context: ContextManager,
        briefing: Arc<BriefingBuilder>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            model,
            api,
            sessions,
            context,
            briefing,
            tools,
        }
    }

    /// Process one user message and return the assistant's reply.
    pub async fn handle_message(&self, user_id: UserId, text: &str) -> Result<String> {
        let mut history = self.sessions.load_history(user_id).await?;

        let briefing = self.briefing.build(user_id, self.context.counter()).await;
        let system_content = render_system_prompt(&briefing);
        let system_prompt_tokens = self.context.count_tokens(&system_content);

        if !history.is_empty() && self.context.needs_summarization(&history, system_prompt_tokens) {
            history = self.summarize_history(user_id, history).await?;
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_content));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(text));

        let schemas = self.tools.schemas();
        let tools = if schemas.is_empty() {
            None
        } else {
            Some(schemas.as_slice())
        };

        let response_text = self.run_tool_loop(messages, tools, user_id).await?;

        history.push(ChatMessage::user(text));
        history.push(ChatMessage::assistant(response_text.clone()));
        self.sessions.save_history(user_id, &history).await?;

        Ok(response_text)
    }

    /// Call the model in a loop, executing tool calls until it produces a
    /// plain text reply or the iteration bound is hit.
    async fn run_tool_loop(
        &self,
        mut messages: Vec<ChatMessage>,
        tools: Option<&[serde_json::Value]>,
        user_id: UserId,
    ) -> Result<String> {
        for _ in 0..MAX_TOOL_ITERATIONS {
            let reply = self.model.chat(&messages, tools).await?;

            let tool_calls = reply.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                return Ok(reply.content.unwrap_or_default());
            }

            // The assistant message goes back verbatim, tool-call
            // structures included.
            messages.push(reply);

            for call in tool_calls {
                let args: serde_json::Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| serde_json::json!({}));

                let content = match self
                    .tools
                    .execute(&*self.api, user_id, &call.function.name, args)
                    .await
                {
                    Ok(serde_json::Value::String(text)) => text,
                    Ok(result) => result.to_string(),
                    Err(error) => {
                        tracing::error!(tool = %call.function.name, %error, "tool call failed");
                        serde_json::json!({"error": error.to_string()}).to_string()
                    }
                };

                messages.push(ChatMessage::tool(call.id, content));
            }
        }

        tracing::warn!(%user_id, "hit max tool iterations");
        Ok(FALLBACK_REPLY.to_string())
    }

    /// Summarize the older half of the history into a single system
    /// message, keeping the recent half verbatim. The summary also feeds
    /// the next session's briefing.
    async fn summarize_history(
        &self,
        user_id: UserId,
        history: Vec<ChatMessage>,
    ) -> Result<Vec<ChatMessage>> {
        let mid = history.len() / 2;
        let (old, recent) = history.split_at(mid);

        let conversation = old
            .iter()
            .filter_map(|m| {
                m.content
                    .as_deref()
                    .map(|content| format!("{}: {content}", m.role))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let reply = self
            .model
            .chat(&[ChatMessage::user(summarize_prompt(&conversation))], None)
            .await?;
        let summary = reply.content.unwrap_or_default();

        if let Err(error) = self.sessions.save_summary(user_id, &summary).await {
            tracing::warn!(%user_id, %error, "failed to persist session summary");
        }

        let mut compacted = Vec::with_capacity(recent.len() + 1);
        compacted.push(ChatMessage::system(format!("{SUMMARY_PREFIX}{summary}")));
        compacted.extend(recent.iter().cloned());

        tracing::info!(
            %user_id,
            summarized = old.len(),
            kept = recent.len(),
            "summarized older half of chat history"
        );

        Ok(compacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::core_client::{ReminderItem, SettingsItem, TaskItem};
    use crate::assistant::model::{ToolCall, ToolCallFunction};
    use crate::assistant::session::testing::MemorySessionStore;
    use crate::error::AgentError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records every request.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<ChatMessage>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn push(&self, reply: ChatMessage) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl AssistantModel for ScriptedModel {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: Option<&[serde_json::Value]>,
        ) -> Result<ChatMessage> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AgentError::Other(anyhow::anyhow!("script exhausted")).into())
        }
    }

    #[derive(Default)]
    struct StubApi {
        tasks: Vec<TaskItem>,
    }

    #[async_trait::async_trait]
    impl AssistantApi for StubApi {
        async fn search_memories(&self, _o: UserId, _q: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!([]))
        }
        async fn get_memory(&self, _id: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn list_tasks(&self, _o: UserId, _s: Option<&str>) -> Result<Vec<TaskItem>> {
            Ok(self.tasks.clone())
        }
        async fn create_task(
            &self,
            _o: UserId,
            _m: Option<&str>,
            _d: &str,
            _due: Option<&str>,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::json!({"id": "t-new"}))
        }
        async fn list_reminders(&self, _o: UserId, _u: bool) -> Result<Vec<ReminderItem>> {
            Ok(Vec::new())
        }
        async fn create_reminder(
            &self,
            _o: UserId,
            _m: Option<&str>,
            _t: &str,
            _f: &str,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
        async fn list_events(&self, _o: UserId) -> Result<serde_json::Value> {
            Ok(serde_json::json!([]))
        }
        async fn get_settings(&self, _u: UserId) -> Result<Option<SettingsItem>> {
            Ok(None)
        }
    }

    fn build_agent(
        model: Arc<ScriptedModel>,
        sessions: Arc<MemorySessionStore>,
        context_window: usize,
    ) -> Agent {
        let api: Arc<dyn AssistantApi> = Arc::new(StubApi::default());
        let briefing = Arc::new(BriefingBuilder::new(api.clone(), sessions.clone(), 200));
        Agent::new(
            model,
            api,
            sessions,
            ContextManager::new("gpt-4o", context_window, 200, 200),
            briefing,
            ToolRegistry::standard(),
        )
    }

    fn tool_call_reply(name: &str, arguments: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".into(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_1".into(),
                call_type: "function".into(),
                function: ToolCallFunction {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            }]),
            tool_call_id: None,
        }
    }

    #[tokio::test]
    async fn test_plain_reply_appends_history() {
        let model = Arc::new(ScriptedModel::default());
        model.push(ChatMessage::assistant("hello there"));
        let sessions = Arc::new(MemorySessionStore::default());
        let agent = build_agent(model.clone(), sessions.clone(), 16_000);

        let reply = agent.handle_message(1, "hi").await.unwrap();
        assert_eq!(reply, "hello there");

        let history = sessions.load_history(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[0].content.as_deref(), Some("hi"));
        assert_eq!(history[1].role, "assistant");

        // The request carried the system prompt with the briefing
        // placeholders rendered in.
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, "system");
        assert!(requests[0][0]
            .content
            .as_deref()
            .unwrap()
            .contains("No upcoming tasks."));
    }

    #[tokio::test]
    async fn test_tool_loop_executes_and_feeds_results_back() {
        let model = Arc::new(ScriptedModel::default());
        // Arguments are invalid JSON: the loop substitutes {}.
        model.push(tool_call_reply("list_tasks", "not json at all"));
        model.push(ChatMessage::assistant("you have nothing to do"));

        let sessions = Arc::new(MemorySessionStore::default());
        let agent = build_agent(model.clone(), sessions, 16_000);

        let reply = agent.handle_message(2, "what's on my plate?").await.unwrap();
        assert_eq!(reply, "you have nothing to do");

        let requests = model.requests();
        assert_eq!(requests.len(), 2);

        // Second request: system + user + assistant(tool_calls) + tool.
        let second = &requests[1];
        let assistant = &second[second.len() - 2];
        assert_eq!(assistant.role, "assistant");
        assert!(assistant.tool_calls.is_some(), "tool-call structure kept verbatim");

        let tool = &second[second.len() - 1];
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool.content.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_to_model() {
        let model = Arc::new(ScriptedModel::default());
        model.push(tool_call_reply("launch_rocket", "{}"));
        model.push(ChatMessage::assistant("sorry, no rockets"));

        let sessions = Arc::new(MemorySessionStore::default());
        let agent = build_agent(model.clone(), sessions, 16_000);

        let reply = agent.handle_message(3, "launch!").await.unwrap();
        assert_eq!(reply, "sorry, no rockets");

        let second = &model.requests()[1];
        let tool = second.last().unwrap();
        assert!(tool.content.as_deref().unwrap().contains("error"));
    }

    #[tokio::test]
    async fn test_iteration_bound_returns_fallback() {
        let model = Arc::new(ScriptedModel::default());
        for _ in 0..MAX_TOOL_ITERATIONS {
            model.push(tool_call_reply("list_tasks", "{}"));
        }

        let sessions = Arc::new(MemorySessionStore::default());
        let agent = build_agent(model.clone(), sessions, 16_000);

        let reply = agent.handle_message(4, "loop forever").await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(model.requests().len(), MAX_TOOL_ITERATIONS);
    }

    #[tokio::test]
    async fn test_oversized_history_is_summarized() {
        let model = Arc::new(ScriptedModel::default());
        // First scripted reply answers the summarize request, the second
        // answers the user turn.
        model.push(ChatMessage::assistant("they planned a trip to Lisbon"));
        model.push(ChatMessage::assistant("noted"));

        let sessions = Arc::new(MemorySessionStore::default());

        // Eight fat messages, far over 70% of a 2000-token window.
        let fat = "hello ".repeat(400);
        let old_history: Vec<ChatMessage> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(fat.trim())
                } else {
                    ChatMessage::assistant(format!("reply number {i}"))
                }
            })
            .collect();
        sessions.save_history(9, &old_history).await.unwrap();

        let agent = build_agent(model.clone(), sessions.clone(), 2_000);
        let reply = agent.handle_message(9, "and one more thing").await.unwrap();
        assert_eq!(reply, "noted");

        let requests = model.requests();
        assert_eq!(requests.len(), 2);

        // The summarize request contains "role: content" lines from the
        // older half only.
        let summarize_request = &requests[0];
        assert_eq!(summarize_request.len(), 1);
        let prompt = summarize_request[0].content.as_deref().unwrap();
        assert!(prompt.contains("Summarize this conversation"));
        assert!(prompt.contains("assistant: reply number 3"));
        assert!(!prompt.contains("reply number 5"), "recent half is not summarized");

        // The main request: the first message after the rendered system
        // prompt is the summary marker, then the recent half verbatim.
        let main_request = &requests[1];
        assert_eq!(main_request[0].role, "system");
        assert_eq!(
            main_request[1].content.as_deref(),
            Some("Summary of earlier conversation: they planned a trip to Lisbon")
        );
        assert_eq!(main_request[2].content.as_deref(), old_history[4].content.as_deref());

        // Persisted history keeps the compacted shape plus the new turn.
        let saved = sessions.load_history(9).await.unwrap();
        assert_eq!(saved.len(), 1 + 4 + 2);
        assert!(saved[0]
            .content
            .as_deref()
            .unwrap()
            .starts_with("Summary of earlier conversation:"));
        assert_eq!(saved[4].content.as_deref(), Some("reply number 7"));
        assert_eq!(saved[5].content.as_deref(), Some("and one more thing"));

        // The summary also landed in the session store for the next
        // session's briefing.
        assert_eq!(
            sessions.load_summary(9).await.unwrap().as_deref(),
            Some("they planned a trip to Lisbon")
        );
    }

    #[tokio::test]
    async fn test_small_history_is_not_summarized() {
        let model = Arc::new(ScriptedModel::default());
        model.push(ChatMessage::assistant("sure"));

        let sessions = Arc::new(MemorySessionStore::default());
        sessions
            .save_history(5, &[ChatMessage::user("short"), ChatMessage::assistant("ok")])
            .await
            .unwrap();

        let agent = build_agent(model.clone(), sessions.clone(), 16_000);
        agent.handle_message(5, "another").await.unwrap();

        // Single model call: no summarize round trip.
        assert_eq!(model.requests().len(), 1);
        let saved = sessions.load_history(5).await.unwrap();
        assert_eq!(saved.len(), 4);
    }
}
