//! Membot: a personal memory-and-task assistant backend.
//!
//! Four cooperating services share a SQLite store (with FTS), a Redis
//! stream broker, and a media blob directory: the Core service (REST CRUD,
//! audit, search index, housekeeping scheduler), the LLM worker (durable
//! job pipeline), the chat gateway (notification consumer + callback
//! state), and the assistant agent (tool-calling conversational loop).

pub mod api;
pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod scheduler;
pub mod store;
pub mod streams;
pub mod worker;

pub use error::{Error, Result};

/// Chat-platform user identifier. Owner of every user-scoped entity.
pub type UserId = i64;

/// Generate a fresh opaque entity id (UUID v4 rendered as text).
pub fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
