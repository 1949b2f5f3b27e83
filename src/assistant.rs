//! Assistant agent: tool-calling conversational loop with summarization,
//! briefing, and a daily digest scheduler. Operates per user against the
//! Core REST API, with session state in the broker's TTL store.

pub mod agent;
pub mod briefing;
pub mod context;
pub mod core_client;
pub mod digest;
pub mod model;
pub mod session;
pub mod tools;

pub use agent::{Agent, MAX_TOOL_ITERATIONS};
pub use briefing::BriefingBuilder;
pub use context::{ContextManager, TokenCounter};
pub use core_client::{AssistantApi, AssistantCoreClient};
pub use digest::DigestScheduler;
pub use model::{AssistantModel, ChatMessage, OpenAiChatClient, ToolCall};
pub use session::{RedisSessionStore, SessionStore};
pub use tools::ToolRegistry;
