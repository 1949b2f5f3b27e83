//! Token-aware chat context management.
//!
//! The model context is partitioned as
//! `window = briefing_budget + response_reserve + system_prompt + chat_budget`.
//! The counter is the deterministic encoder for the configured model; a
//! byte-count approximation would shift the summarization threshold, so
//! the real tokenizer is used even though it costs a dictionary load.

use crate::assistant::model::ChatMessage;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};

/// History is summarized once it exceeds this fraction of the chat
/// budget. At exactly the threshold nothing happens; strictly greater
/// triggers.
const SUMMARIZE_THRESHOLD: f64 = 0.7;

/// Deterministic token counter bound to a model family.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    /// Resolve the encoder for a model name, falling back to `cl100k_base`
    /// for models tiktoken does not know.
    pub fn for_model(model: &str) -> Self {
        let bpe = get_bpe_from_model(model).or_else(|_| cl100k_base());
        match bpe {
            Ok(bpe) => Self { bpe },
            // cl100k_base data is compiled in; construction only fails if
            // the embedded vocabulary is unreadable.
            Err(error) => panic!("token encoder unavailable: {error}"),
        }
    }

    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }
}

pub struct ContextManager {
    counter: TokenCounter,
    context_window_tokens: usize,
    briefing_budget_tokens: usize,
    response_reserve_tokens: usize,
}

impl ContextManager {
    pub fn new(
        model: &str,
        context_window_tokens: usize,
        briefing_budget_tokens: usize,
        response_reserve_tokens: usize,
    ) -> Self {
        Self {
            counter: TokenCounter::for_model(model),
            context_window_tokens,
            briefing_budget_tokens,
            response_reserve_tokens,
        }
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Tokens available for chat history after the other segments.
    /// `system_prompt_tokens` is the measured size of the rendered system
    /// prompt, briefing included.
    pub fn chat_budget_tokens(&self, system_prompt_tokens: usize) -> usize {
        self.context_window_tokens
            .saturating_sub(self.briefing_budget_tokens)
            .saturating_sub(self.response_reserve_tokens)
            .saturating_sub(system_prompt_tokens)
    }

    /// Total tokens across all message contents.
    pub fn count_messages_tokens(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .filter_map(|m| m.content.as_deref())
            .map(|content| self.counter.count(content))
            .sum()
    }

    /// True when history exceeds 70% of the chat budget.
    pub fn needs_summarization(
        &self,
        messages: &[ChatMessage],
        system_prompt_tokens: usize,
    ) -> bool {
        let threshold =
            (self.chat_budget_tokens(system_prompt_tokens) as f64 * SUMMARIZE_THRESHOLD) as usize;
        self.count_messages_tokens(messages) > threshold
    }
}
