//! LINE Messaging API channel.
//!
//! Messages arrive via webhook (push-based). Each delivery is authenticated
//! with `X-Line-Signature`, the base64 HMAC-SHA256 of the raw body keyed by the
//! channel secret. Replies go through the reply API using the event's
//! single-use reply token.

use crate::message::{ChannelMessage, MessageContent, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use base64::Engine;
use faq_common::config::LineConfig;
use faq_common::logging::generate_trace_id;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// LINE rejects text messages longer than this many characters.
const MAX_TEXT_CHARS: usize = 5000;

/// LINE channel using the Messaging API.
pub struct LineChannel {
    channel_access_token: Option<String>,
    channel_secret: Option<String>,
    api_base: String,
    client: Client,
}

impl LineChannel {
    /// Create a new LINE channel. Empty credentials are treated as unset.
    pub fn new(channel_access_token: Option<String>, channel_secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            channel_access_token: channel_access_token.filter(|t| !t.trim().is_empty()),
            channel_secret: channel_secret.filter(|s| !s.trim().is_empty()),
            api_base: "https://api.line.me".into(),
            client,
        }
    }

    /// Override the API base URL (proxies and tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_config(config: &LineConfig) -> Self {
        Self::new(
            config.channel_access_token.clone(),
            config.channel_secret.clone(),
        )
        .with_api_base(config.api_base.clone())
    }

    /// Check `signature` (the raw `X-Line-Signature` value) against `body`.
    ///
    /// Fails with `NotReady` when no channel secret is configured and with
    /// `Auth` when the signature is malformed or does not match.
    pub fn verify_signature(&self, body: &[u8], signature: &str) -> ChannelResult<()> {
        let mac = self.mac_for(body)?;

        let expected = base64::engine::general_purpose::STANDARD
            .decode(signature.trim())
            .map_err(|_| ChannelError::Auth("malformed signature".into()))?;

        // Constant-time comparison
        mac.verify_slice(&expected)
            .map_err(|_| ChannelError::Auth("signature mismatch".into()))
    }

    /// Compute the signature LINE would send for `body`.
    pub fn sign(&self, body: &[u8]) -> ChannelResult<String> {
        let mac = self.mac_for(body)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn mac_for(&self, body: &[u8]) -> ChannelResult<HmacSha256> {
        let secret = self
            .channel_secret
            .as_deref()
            .ok_or_else(|| ChannelError::NotReady("CHANNEL_SECRET is not configured".into()))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ChannelError::Internal(format!("HMAC key error: {e}")))?;
        mac.update(body);
        Ok(mac)
    }

    /// Decode a webhook body into the text messages it carries.
    ///
    /// Non-text events are logged and skipped. An empty `events` array (the
    /// console's verification request) yields no messages.
    pub fn parse_webhook(&self, body: &[u8]) -> ChannelResult<Vec<ChannelMessage>> {
        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ChannelError::InvalidMessage(format!("invalid webhook payload: {e}")))?;

        if payload.events.is_empty() {
            tracing::info!(destination = ?payload.destination, "LINE webhook verification request");
        }

        Ok(payload
            .events
            .into_iter()
            .filter_map(WebhookEvent::into_message)
            .collect())
    }

    async fn reply(&self, reply_token: &str, text: &str) -> ChannelResult<String> {
        let token = self
            .channel_access_token
            .as_deref()
            .ok_or_else(|| ChannelError::Auth("CHANNEL_ACCESS_TOKEN is not configured".into()))?;

        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = ReplyRequest {
            reply_token,
            messages: vec![TextMessage {
                kind: "text",
                text: truncate_chars(text, MAX_TEXT_CHARS),
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ChannelError::Auth(format!("LINE API error ({status}): {error_body}")),
                _ => ChannelError::SendFailed(format!("LINE API error ({status}): {error_body}")),
            });
        }

        let sent: ReplyResponse = response.json().await.unwrap_or_default();
        Ok(sent
            .sent_messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Channel for LineChannel {
    fn name(&self) -> &'static str {
        "line"
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        match &message.content {
            OutgoingContent::Text { text } => self.reply(&message.reply_token, text).await,
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        if self.channel_access_token.is_none() {
            return Err(ChannelError::NotReady(
                "CHANNEL_ACCESS_TOKEN is not configured".into(),
            ));
        }
        if self.channel_secret.is_none() {
            return Err(ChannelError::NotReady("CHANNEL_SECRET is not configured".into()));
        }
        Ok(())
    }
}

/// Authenticate and decode one webhook delivery.
pub fn process_webhook(
    channel: &LineChannel,
    signature: Option<&str>,
    body: &[u8],
) -> ChannelResult<Vec<ChannelMessage>> {
    // A missing secret is a server problem, reported before the caller's signature
    if channel.channel_secret.is_none() {
        return Err(ChannelError::NotReady("CHANNEL_SECRET is not configured".into()));
    }

    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ChannelError::Auth("missing signature".into()))?;
    channel.verify_signature(body, signature)?;

    channel.parse_webhook(body)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => {
            tracing::warn!(max_chars = max, "Reply truncated to LINE text limit");
            text[..idx].to_string()
        }
        None => text.to_string(),
    }
}

// ============================================================================
// Webhook Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<EventSource>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    message: Option<EventMessage>,
    #[serde(default)]
    webhook_event_id: Option<String>,
    #[serde(default)]
    delivery_context: Option<DeliveryContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    #[serde(rename = "type")]
    source_type: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryContext {
    #[serde(default)]
    is_redelivery: bool,
}

impl WebhookEvent {
    fn into_message(self) -> Option<ChannelMessage> {
        if self.event_type != "message" {
            tracing::debug!(event_type = %self.event_type, "Ignoring non-message LINE event");
            return None;
        }

        let message = self.message?;
        let text = match (message.message_type.as_str(), message.text) {
            ("text", Some(text)) => text,
            (other, _) => {
                tracing::debug!(message_type = %other, "Ignoring non-text LINE message");
                return None;
            }
        };

        let Some(reply_token) = self.reply_token else {
            tracing::warn!(message_id = %message.id, "LINE text message without reply token");
            return None;
        };

        let Some(source) = self.source else {
            tracing::warn!(message_id = %message.id, "LINE text message without source");
            return None;
        };

        let Some(user_id) = source
            .user_id
            .clone()
            .or_else(|| source.group_id.clone())
            .or_else(|| source.room_id.clone())
        else {
            tracing::warn!(message_id = %message.id, "LINE message source has no identifier");
            return None;
        };

        let mut metadata = HashMap::new();
        metadata.insert("source_type".to_string(), source.source_type);
        if let Some(group_id) = source.group_id {
            metadata.insert("group_id".to_string(), group_id);
        }
        if let Some(room_id) = source.room_id {
            metadata.insert("room_id".to_string(), room_id);
        }
        if let Some(event_id) = self.webhook_event_id {
            metadata.insert("webhook_event_id".to_string(), event_id);
        }
        if self.delivery_context.is_some_and(|ctx| ctx.is_redelivery) {
            metadata.insert("redelivery".to_string(), "true".to_string());
        }

        Some(ChannelMessage {
            id: message.id,
            user_id,
            reply_token,
            content: MessageContent::Text { text },
            metadata,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            trace_id: generate_trace_id(),
        })
    }
}

// ============================================================================
// Reply API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage>,
}

#[derive(Debug, Serialize)]
struct TextMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyResponse {
    #[serde(default)]
    sent_messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}
