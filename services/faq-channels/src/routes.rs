//! HTTP routes for the LINE webhook service.
//!
//! - `POST /callback`: LINE webhook (signature check, decode, enqueue)
//! - `GET /`: liveness string
//! - `GET /health`, `GET /ready`: JSON probes

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::line::{self, LineChannel, SIGNATURE_HEADER};
use crate::message::ChannelMessage;
use crate::traits::{Channel, ChannelError};

/// Maximum accepted webhook body.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Per-request timeout for inbound requests.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Capacity of the queue between the webhook and the processor.
const QUEUE_CAPACITY: usize = 100;

// ============================================================================
// State
// ============================================================================

/// Shared state for the HTTP server.
pub struct ChannelsState {
    /// LINE channel used to authenticate and decode deliveries
    pub line: Arc<LineChannel>,
    /// Queue feeding the message processor
    pub message_tx: mpsc::Sender<ChannelMessage>,
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

impl HealthResponse {
    fn new(status: &'static str) -> Json<Self> {
        Json(Self {
            status,
            service: "faq-channels",
            version: env!("CARGO_PKG_VERSION"),
        })
    }
}

async fn index() -> &'static str {
    "LINE FAQ bot is running"
}

async fn health() -> impl IntoResponse {
    HealthResponse::new("healthy")
}

async fn ready(State(state): State<Arc<ChannelsState>>) -> impl IntoResponse {
    if let Err(e) = state.line.health_check().await {
        tracing::warn!(error = %e, "LINE channel not ready");
        return (StatusCode::SERVICE_UNAVAILABLE, HealthResponse::new("not_ready"));
    }
    if state.message_tx.is_closed() {
        return (StatusCode::SERVICE_UNAVAILABLE, HealthResponse::new("not_ready"));
    }

    (StatusCode::OK, HealthResponse::new("ready"))
}

// ============================================================================
// LINE Webhook
// ============================================================================

/// POST /callback: LINE webhook delivery.
///
/// Replies are sent asynchronously through the reply API; the HTTP response
/// only acknowledges receipt. A full queue is reported as 503 right away
/// instead of holding the request until the timeout layer fires.
async fn line_callback(
    State(state): State<Arc<ChannelsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let messages = match line::process_webhook(&state.line, signature, &body) {
        Ok(messages) => messages,
        Err(ChannelError::Auth(reason)) => {
            tracing::warn!(
                reason = %reason,
                signature = if signature.is_some() { "present" } else { "missing" },
                "LINE webhook signature verification failed"
            );
            return (StatusCode::BAD_REQUEST, "Invalid signature");
        }
        Err(ChannelError::InvalidMessage(reason)) => {
            tracing::warn!(reason = %reason, "LINE webhook payload rejected");
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
        Err(e) => {
            tracing::error!(error = %e, "LINE webhook cannot be processed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    for msg in messages {
        tracing::info!(
            trace_id = %msg.trace_id,
            user_id = %msg.user_id,
            "LINE message: {}",
            msg.text().chars().take(50).collect::<String>()
        );

        match state.message_tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(
                    trace_id = %msg.trace_id,
                    user_id = %msg.user_id,
                    "Message queue full, rejecting LINE delivery"
                );
                return (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("Message queue closed, cannot enqueue LINE message");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        }
    }

    (StatusCode::OK, "OK")
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the HTTP router.
pub fn build_router(state: Arc<ChannelsState>) -> Router {
    Router::new()
        .route("/", get(index))
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Channel webhook
        .route("/callback", post(line_callback))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
}

/// Create the server state with the receiving end of the message queue.
pub fn create_state(
    line: Arc<LineChannel>,
) -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
    create_state_with_capacity(line, QUEUE_CAPACITY)
}

/// Like [`create_state`], with an explicit queue capacity.
pub fn create_state_with_capacity(
    line: Arc<LineChannel>,
    capacity: usize,
) -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
    let (tx, rx) = mpsc::channel(capacity);

    let state = Arc::new(ChannelsState {
        line,
        message_tx: tx,
    });

    (state, rx)
}
