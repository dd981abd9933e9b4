//! Static FAQ table and question matching.
//!
//! The table is a JSON array of `{question, answer}` objects loaded once at
//! startup. Matching is a literal, case-insensitive substring check: the first
//! entry (in file order) whose question appears anywhere in the user's text wins.

use faq_common::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A single question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Read-only FAQ table.
#[derive(Debug, Default)]
pub struct FaqStore {
    /// Entries with their lowercased question, in load order
    entries: Vec<(String, FaqEntry)>,
}

impl FaqStore {
    /// Build a store from entries, preserving their order.
    ///
    /// Entries whose question is blank are skipped: an empty needle would
    /// match every message.
    pub fn from_entries(entries: Vec<FaqEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|entry| {
                let blank = entry.question.trim().is_empty();
                if blank {
                    tracing::warn!(answer = %entry.answer, "Skipping FAQ entry with empty question");
                }
                !blank
            })
            .map(|entry| (entry.question.to_lowercase(), entry))
            .collect();

        Self { entries }
    }

    /// Parse a store from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<FaqEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    /// Load the FAQ file.
    ///
    /// A missing or malformed file is an error; callers treat it as fatal at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read FAQ data from {}", path.display()))?;

        let store = Self::from_json(&content)
            .map_err(|e| e.with_context(format!("Failed to parse FAQ data from {}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            entries = store.len(),
            "Loaded FAQ data"
        );
        Ok(store)
    }

    /// Find the answer for the first entry whose question occurs in `text`.
    pub fn find_answer(&self, text: &str) -> Option<&str> {
        self.find_entry(text).map(|entry| entry.answer.as_str())
    }

    /// Find the first matching entry.
    pub fn find_entry(&self, text: &str) -> Option<&FaqEntry> {
        let haystack = text.to_lowercase();
        self.entries
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, entry)| entry)
    }

    /// Iterate the entries in load order.
    pub fn entries(&self) -> impl Iterator<Item = &FaqEntry> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
