//! FAQ Agent - answer selection for the FAQ bot.
//!
//! Provides the reply pipeline that:
//! - Records each user message in a bounded per-user history
//! - Answers from the static FAQ table when a question matches
//! - Otherwise calls the chat-completion provider with the system prompt and history
//! - Records the reply in the history
//!
//! ## Example
//!
//! ```ignore
//! use faq_agent::{FaqStore, InMemorySessionStore, OpenAIProvider, Responder};
//!
//! let responder = Responder::new(
//!     Arc::new(FaqStore::load(&config.faq.path)?),
//!     Arc::new(InMemorySessionStore::new(config.session.max_history)),
//!     Arc::new(OpenAIProvider::from_config(&config.llm)),
//!     ResponderOptions::from_config(&config),
//! );
//!
//! let reply = responder.respond("U4af4980629...", "請問營業時間是?").await?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod knowledge;
pub mod provider;
pub mod responder;
pub mod session;

pub use knowledge::{FaqEntry, FaqStore};
pub use provider::{ChatRequest, ChatResponse, Message, OpenAIProvider, Provider, ProviderError, Role};
pub use responder::{Reply, ReplySource, Responder, ResponderError, ResponderOptions};
pub use session::{HistoryEntry, InMemorySessionStore, SessionStore};
