//! Bridge between inbound channel messages and the responder.
//!
//! The webhook handler only authenticates and enqueues. The processor spawned
//! here drains the queue, runs each message through the [`Responder`] in its
//! own task and sends the reply back through the channel. Messages from one
//! user are answered in queue order; different users run concurrently.

use crate::message::{ChannelMessage, OutgoingMessage};
use crate::traits::{Channel, ChannelError};
use faq_agent::{Responder, ResponderError};
use faq_common::channel_span;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Number of tracked users before finished entries are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Error from processing a single message.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Responder(#[from] ResponderError),

    #[error("Failed to deliver reply: {0}")]
    Delivery(#[from] ChannelError),
}

/// Outcome of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Reply delivered; carries the platform message ID (may be empty)
    Replied(String),
    /// Shutdown began before the reply was ready
    Cancelled,
}

/// Routes channel messages through the responder.
pub struct AssistantBridge {
    responder: Arc<Responder>,
    channel: Arc<dyn Channel>,
    cancel: CancellationToken,
}

impl AssistantBridge {
    pub fn new(responder: Arc<Responder>, channel: Arc<dyn Channel>) -> Self {
        Self {
            responder,
            channel,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, so shutdown can stop in-flight work.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Answer one message and send the reply.
    pub async fn process(&self, message: ChannelMessage) -> Result<Processed, BridgeError> {
        let span = channel_span!(
            self.channel.name(),
            message.trace_id,
            message.user_id,
            message_id = %message.id
        );

        async move {
            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Shutdown in progress, dropping message");
                    return Ok(Processed::Cancelled);
                }
                reply = self.responder.respond(&message.user_id, message.text()) => reply?,
            };

            let message_id = self
                .channel
                .send(OutgoingMessage::text(&message.reply_token, &reply.text))
                .await?;

            tracing::info!(
                source = reply.source.as_str(),
                reply_chars = reply.text.chars().count(),
                "Reply sent"
            );
            Ok::<_, BridgeError>(Processed::Replied(message_id))
        }
        .instrument(span)
        .await
    }

    /// Spawn the queue consumer. Each message is processed in its own task.
    ///
    /// A message waits for the previous message of the same user to finish,
    /// so history and replies keep the order in which LINE delivered them.
    /// The consumer stops when the queue closes or the token is cancelled.
    pub fn spawn_processor(
        bridge: Arc<Self>,
        mut rx: mpsc::Receiver<ChannelMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Message processor started");

            // Completion signal of the latest message queued per user
            let mut tails: HashMap<String, oneshot::Receiver<()>> = HashMap::new();

            loop {
                let message = tokio::select! {
                    biased;
                    _ = bridge.cancel.cancelled() => break,
                    message = rx.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };

                if tails.len() >= PRUNE_THRESHOLD {
                    tails.retain(|_, done| {
                        matches!(done.try_recv(), Err(oneshot::error::TryRecvError::Empty))
                    });
                }

                let (done_tx, done_rx) = oneshot::channel();
                let previous = tails.insert(message.user_id.clone(), done_rx);

                let bridge = bridge.clone();
                tokio::spawn(async move {
                    // Resolves on completion, or when the previous task is dropped
                    if let Some(previous) = previous {
                        let _ = previous.await;
                    }
                    if let Err(e) = bridge.process(message).await {
                        tracing::error!(error = %e, "Failed to process message");
                    }
                    let _ = done_tx.send(());
                });
            }

            tracing::info!("Message processor stopped");
        })
    }
}
