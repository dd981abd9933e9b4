//! Message types for channel communication.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inbound user message, decoded from a webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Conversation key: the LINE user, or the group/room when no user is present
    pub user_id: String,
    /// Single-use token for the reply API
    pub reply_token: String,
    /// Message content
    pub content: MessageContent,
    /// Additional metadata (source type, group id, webhook event id)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID for request tracking
    pub trace_id: String,
}

impl ChannelMessage {
    /// Get the text content.
    pub fn text(&self) -> &str {
        match &self.content {
            MessageContent::Text { text } => text,
        }
    }
}

/// Message content types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message
    Text { text: String },
}

/// Outgoing reply bound to a reply token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub reply_token: String,
    pub content: OutgoingContent,
}

impl OutgoingMessage {
    pub fn text(reply_token: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            reply_token: reply_token.into(),
            content: OutgoingContent::Text { text: text.into() },
        }
    }
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text
    Text { text: String },
}
