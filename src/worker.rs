//! LLM worker: durable job pipeline over Redis streams.
//!
//! Each replica round-robins over the per-job-type input streams with a
//! short blocking read, invokes the matching handler, writes the outcome
//! back to Core over REST, and publishes downstream notifications.
//! Retries are bounded with exponential backoff and poisoned messages
//! never wedge a stream.

pub mod consumer;
pub mod core_client;
pub mod extract;
pub mod handlers;
pub mod llm_client;
pub mod prompts;
pub mod retry;

pub use consumer::{process_message, run_consumer};
pub use core_client::{CoreApi, CoreApiClient, OpenTask};
pub use extract::extract_json;
pub use handlers::{default_handlers, JobHandler};
pub use llm_client::{ChatModel, LlmClient};
pub use retry::RetryTracker;
