//! Per-user conversation history.
//!
//! The responder only talks to the [`SessionStore`] trait, so the in-memory
//! store can be replaced by a persistent or externally synchronized one
//! without touching dispatch logic.

use crate::provider::Role;
use async_trait::async_trait;
use dashmap::DashMap;
use faq_common::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One exchanged message in a user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Storage for bounded per-user histories.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current history for a user, oldest first. Unknown users have an empty history.
    async fn get(&self, user_id: &str) -> Result<Vec<HistoryEntry>>;

    /// Append an entry, dropping the oldest entries beyond the store's capacity.
    async fn append(&self, user_id: &str, entry: HistoryEntry) -> Result<()>;

    /// Forget a user's history. Returns whether a session existed.
    async fn evict(&self, user_id: &str) -> Result<bool>;
}

/// Process-memory session store. Histories are lost on restart.
///
/// Appends are atomic per user (the map shard is locked for the whole
/// read-modify-write), so concurrent webhook deliveries never lose entries.
pub struct InMemorySessionStore {
    sessions: DashMap<String, VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl InMemorySessionStore {
    /// Create a store keeping the last `capacity` entries per user.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
        }
    }

    /// Number of users with a history.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .sessions
            .get(user_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, user_id: &str, entry: HistoryEntry) -> Result<()> {
        let mut history = self.sessions.entry(user_id.to_string()).or_default();
        history.push_back(entry);
        while history.len() > self.capacity {
            history.pop_front();
        }
        Ok(())
    }

    async fn evict(&self, user_id: &str) -> Result<bool> {
        Ok(self.sessions.remove(user_id).is_some())
    }
}
