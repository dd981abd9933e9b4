//! Reply selection for a single inbound user message.
//!
//! Flow per message:
//! 1. Record the user message in the session history
//! 2. Answer from the FAQ table if a question matches (no completion call)
//! 3. Otherwise send `[system prompt] + history` to the provider, bounded by a
//!    concurrency limit and a per-call timeout
//! 4. Record the reply in the session history

use crate::knowledge::FaqStore;
use crate::provider::{ChatRequest, Message, Provider, ProviderError};
use crate::session::{HistoryEntry, SessionStore};
use faq_common::config::Config;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Faq,
    Completion,
}

impl ReplySource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::Completion => "completion",
        }
    }
}

/// Text to send back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("Completion failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Completion returned an empty reply")]
    EmptyReply,

    #[error("Session store error: {0}")]
    Session(#[from] faq_common::Error),

    #[error("Responder is shutting down")]
    Closed,
}

/// Tunables for the reply pipeline.
#[derive(Debug, Clone)]
pub struct ResponderOptions {
    /// System instruction; `None` sends the history alone
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub match_before_completion: bool,
}

impl ResponderOptions {
    pub fn from_config(config: &Config) -> Self {
        let prompt = config.llm.system_prompt.trim();
        Self {
            system_prompt: (!prompt.is_empty()).then(|| prompt.to_string()),
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            timeout: Duration::from_secs(config.llm.timeout_secs.max(1)),
            max_concurrency: config.llm.max_concurrency,
            match_before_completion: config.faq.match_before_completion,
        }
    }
}

impl Default for ResponderOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Chooses between the FAQ table and the completion provider.
pub struct Responder {
    faq: Arc<FaqStore>,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    options: ResponderOptions,
    permits: Semaphore,
}

impl Responder {
    pub fn new(
        faq: Arc<FaqStore>,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        options: ResponderOptions,
    ) -> Self {
        let permits = Semaphore::new(options.max_concurrency.max(1));
        Self {
            faq,
            sessions,
            provider,
            options,
            permits,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Produce the reply to `text` from `user_id`, updating that user's history.
    pub async fn respond(&self, user_id: &str, text: &str) -> Result<Reply, ResponderError> {
        self.sessions.append(user_id, HistoryEntry::user(text)).await?;

        if self.options.match_before_completion {
            if let Some(answer) = self.faq.find_answer(text) {
                tracing::info!(user_id = %user_id, "FAQ match, skipping completion");
                let answer = answer.to_string();
                self.sessions
                    .append(user_id, HistoryEntry::assistant(answer.clone()))
                    .await?;
                return Ok(Reply {
                    text: answer,
                    source: ReplySource::Faq,
                });
            }
        }

        let history = self.sessions.get(user_id).await?;
        let request = ChatRequest {
            model: self.options.model.clone(),
            messages: self.build_messages(&history),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let reply = self.complete(request).await?;

        self.sessions
            .append(user_id, HistoryEntry::assistant(reply.clone()))
            .await?;

        Ok(Reply {
            text: reply,
            source: ReplySource::Completion,
        })
    }

    /// System instruction (if any) followed by the history, oldest first.
    pub fn build_messages(&self, history: &[HistoryEntry]) -> Vec<Message> {
        self.options
            .system_prompt
            .iter()
            .map(Message::system)
            .chain(history.iter().map(|entry| Message {
                role: entry.role,
                content: entry.content.clone(),
            }))
            .collect()
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ResponderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ResponderError::Closed)?;

        let start = Instant::now();
        let response = tokio::time::timeout(self.options.timeout, self.provider.chat(request))
            .await
            .map_err(|_| ResponderError::Timeout(self.options.timeout))??;

        tracing::info!(
            provider = %response.provider,
            model = %response.model,
            latency_ms = start.elapsed().as_millis() as u64,
            total_tokens = response.usage.total_tokens,
            "Completion received"
        );

        let text = response.content.trim();
        if text.is_empty() {
            return Err(ResponderError::EmptyReply);
        }
        Ok(text.to_string())
    }

    /// Stop handing out completion permits; waiting and future calls fail with `Closed`.
    pub fn close(&self) {
        self.permits.close();
    }
}
