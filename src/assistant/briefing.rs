//! Briefing builder: the pre-computed context block embedded in the
//! system prompt each turn.

use crate::assistant::context::TokenCounter;
use crate::assistant::core_client::AssistantApi;
use crate::assistant::session::SessionStore;
use crate::UserId;
use std::sync::Arc;

const MAX_BRIEFING_ITEMS: usize = 20;

pub struct BriefingBuilder {
    api: Arc<dyn AssistantApi>,
    sessions: Arc<dyn SessionStore>,
    budget_tokens: usize,
}

impl BriefingBuilder {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        sessions: Arc<dyn SessionStore>,
        budget_tokens: usize,
    ) -> Self {
        Self {
            api,
            sessions,
            budget_tokens,
        }
    }

    /// Build the briefing text for a user: up to 20 open tasks, up to 20
    /// upcoming reminders, and the previous session summary. Core errors
    /// degrade to the section's "no items" placeholder.
    pub async fn build(&self, user_id: UserId, counter: &TokenCounter) -> String {
        let mut sections = Vec::new();

        let tasks = match self.api.list_tasks(user_id, Some("NOT_DONE")).await {
            Ok(tasks) => tasks,
            Err(error) => {
                tracing::error!(%user_id, %error, "failed to fetch tasks for briefing");
                Vec::new()
            }
        };
        if tasks.is_empty() {
            sections.push("## Upcoming Tasks\nNo upcoming tasks.".to_string());
        } else {
            let mut lines = vec!["## Upcoming Tasks".to_string()];
            for task in tasks.iter().take(MAX_BRIEFING_ITEMS) {
                let due = task
                    .due_at
                    .as_deref()
                    .map(|d| format!(" due:{d}"))
                    .unwrap_or_default();
                lines.push(format!("- [TASK {}]{} \"{}\"", task.id, due, task.description));
            }
            sections.push(lines.join("\n"));
        }

        let reminders = match self.api.list_reminders(user_id, true).await {
            Ok(reminders) => reminders,
            Err(error) => {
                tracing::error!(%user_id, %error, "failed to fetch reminders for briefing");
                Vec::new()
            }
        };
        if reminders.is_empty() {
            sections.push("## Upcoming Reminders\nNo upcoming reminders.".to_string());
        } else {
            let mut lines = vec!["## Upcoming Reminders".to_string()];
            for reminder in reminders.iter().take(MAX_BRIEFING_ITEMS) {
                lines.push(format!(
                    "- [REMINDER {}] fires:{} \"{}\"",
                    reminder.id, reminder.fire_at, reminder.text
                ));
            }
            sections.push(lines.join("\n"));
        }

        let summary = match self.sessions.load_summary(user_id).await {
            Ok(summary) => summary,
            Err(error) => {
                tracing::error!(%user_id, %error, "failed to load session summary");
                None
            }
        };
        if let Some(summary) = summary {
            sections.push(format!("## Previous Conversation\n{summary}"));
        }

        trim_to_budget(&sections.join("\n\n"), self.budget_tokens, counter)
    }
}

/// Drop trailing lines until the text fits the token budget.
fn trim_to_budget(text: &str, budget_tokens: usize, counter: &TokenCounter) -> String {
    if counter.count(text) <= budget_tokens {
        return text.to_string();
    }

    let mut lines: Vec<&str> = text.split('\n').collect();
    while !lines.is_empty() && counter.count(&lines.join("\n")) > budget_tokens {
        lines.pop();
    }
    lines.join("\n")
}
