pub mod gateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::ClientEvent;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// Confirmation returned by the client for a delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub id: String,
}

/// A chat known to the paired account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Option<usize>,
}

/// The external WhatsApp client. Connection, pairing and session storage all
/// live on the other side of this trait.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_message(&self, address: &str, text: &str) -> Result<MessageReceipt, SendError>;

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SendError>;

    /// Current connection state, expressed as the event that led to it.
    async fn connection_state(&self) -> Result<ClientEvent, SendError>;
}
