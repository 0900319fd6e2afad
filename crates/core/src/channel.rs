//! Channel trait — the abstraction over chat platforms.
//!
//! A Channel connects RelayMind to a messaging platform (Telegram, the local
//! terminal). It yields inbound text messages and delivers replies back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;
use crate::message::UserId;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The channel this message belongs to
    pub channel_id: ChannelId,

    /// Stable platform user ID (history partition key)
    pub sender_id: UserId,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// The text content
    pub content: String,

    /// The chat/group/DM identifier within the channel
    pub chat_id: String,

    /// Platform message id, used to thread the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "telegram", "cli").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for incoming messages.
    ///
    /// Returns a receiver that yields incoming messages. Polling happens in a
    /// background task owned by the implementation.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelMessage, ChannelError>>,
        ChannelError,
    >;

    /// Send a reply to a specific chat.
    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> std::result::Result<(), ChannelError>;

    /// Send a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(()) // No-op default
    }

    /// Check if a sender is allowed (allowlist check).
    fn is_allowed(&self, sender_id: UserId) -> bool;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check — is the channel connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
