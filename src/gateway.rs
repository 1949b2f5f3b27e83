//! Chat gateway core: the notification consumer and the per-user
//! pending-action state machine.
//!
//! The platform SDK itself is an external collaborator behind
//! [`ChatInterface`]; everything here is platform-agnostic.

pub mod consumer;
pub mod core_client;
pub mod state;

pub use consumer::{render_notification, run_notify_consumer};
pub use core_client::{GatewayApi, GatewayCoreClient};
pub use state::{handle_pending_input, parse_user_datetime, PendingAction, PendingActionStore};

use crate::error::Result;
use crate::UserId;

/// Outbound side of a chat platform adapter.
#[async_trait::async_trait]
pub trait ChatInterface: Send + Sync {
    /// Deliver a message to a user.
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// Adapter that writes outbound messages to the log. Stands in for a real
/// platform adapter in development and tests.
pub struct ConsoleChatInterface;

#[async_trait::async_trait]
impl ChatInterface for ConsoleChatInterface {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<()> {
        tracing::info!(%user_id, %text, "outbound chat message");
        Ok(())
    }
}
