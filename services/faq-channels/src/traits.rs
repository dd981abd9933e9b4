//! Channel traits for implementing channel adapters.

use crate::message::OutgoingMessage;
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel not ready: {0}")]
    NotReady(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outbound side of a messaging channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Send a message. Returns the platform message ID when one is reported.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Check if the channel is usable.
    async fn health_check(&self) -> ChannelResult<()>;
}
