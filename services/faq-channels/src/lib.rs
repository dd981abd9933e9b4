//! FAQ Channels - LINE webhook service for the FAQ bot.
//!
//! ## Architecture
//!
//! The service receives LINE webhook deliveries, authenticates them, and
//! queues each text message for the bridge. The bridge asks the responder for
//! a reply (FAQ table first, chat completion otherwise) and sends it back
//! through the LINE reply API.
//!
//! ```text
//! LINE → /callback → queue → AssistantBridge → Responder
//!                                  ↓
//! LINE ←──── reply API ←──── LineChannel
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bridge;
pub mod line;
pub mod message;
pub mod routes;
pub mod traits;

// Re-export commonly used types
pub use bridge::{AssistantBridge, BridgeError, Processed};
pub use line::LineChannel;
pub use message::{ChannelMessage, MessageContent, OutgoingContent, OutgoingMessage};
pub use routes::{build_router, create_state, ChannelsState};
pub use traits::{Channel, ChannelError, ChannelResult};

use anyhow::Context;
use faq_agent::{FaqStore, InMemorySessionStore, OpenAIProvider, Responder, ResponderOptions};
use faq_common::config::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build the HTTP router and the LINE channel, returning the queue receiver.
pub fn build_channels_router(
    config: &Config,
) -> (
    axum::Router,
    tokio::sync::mpsc::Receiver<ChannelMessage>,
    Arc<LineChannel>,
) {
    let line = Arc::new(LineChannel::from_config(&config.line));
    let (state, rx) = create_state(line.clone());
    (build_router(state), rx, line)
}

/// Build the responder: load the FAQ table and wire the session store and provider.
///
/// Fails if the FAQ file is missing or malformed.
pub fn build_responder(config: &Config) -> anyhow::Result<Arc<Responder>> {
    let faq = FaqStore::load(&config.faq.path).context("Failed to load FAQ data")?;

    Ok(Arc::new(Responder::new(
        Arc::new(faq),
        Arc::new(InMemorySessionStore::new(config.session.max_history)),
        Arc::new(OpenAIProvider::from_config(&config.llm)),
        ResponderOptions::from_config(config),
    )))
}

/// Start the HTTP server and the message processor; run until ctrl-c.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    for name in config.missing_credentials() {
        tracing::warn!(credential = name, "Credential not configured; requests needing it will fail");
    }

    let addr = config.listen_addr()?;
    let responder = build_responder(config)?;
    let (router, rx, line) = build_channels_router(config);

    let cancel = CancellationToken::new();
    let bridge = Arc::new(
        AssistantBridge::new(responder.clone(), line).with_cancellation(cancel.clone()),
    );
    let processor_handle = AssistantBridge::spawn_processor(bridge, rx);

    tracing::info!("Starting FAQ Channels on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Stop in-flight work
    cancel.cancel();
    responder.close();
    if let Err(e) = processor_handle.await {
        tracing::warn!(error = %e, "Message processor ended abnormally");
    }

    tracing::info!("FAQ Channels stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {}
    }
}
