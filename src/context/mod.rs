//! Context carryover across conversation turns.
//!
//! Decides whether a user turn continues the prior topic and, if so, broadens
//! retrieval with terms from earlier answers while bounding redundant passage
//! growth. Heuristic substring matching only; no NLP.


use itertools::Itertools;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::retrieval::{Passage, fingerprint};

/// Phrases that mark a user turn as continuing the previous topic.
const FOLLOW_UP_TRIGGERS: [&str; 6] = [
    "more about",
    "what about",
    "explain",
    "how about",
    "tell me",
    "that",
];

const KEY_TERM_COUNT: usize = 5;

/// True when the lowercased query contains any trigger phrase.
#[inline]
pub fn is_follow_up(query: &str) -> bool {
    let query = query.to_lowercase();
    FOLLOW_UP_TRIGGERS
        .iter()
        .any(|trigger| query.contains(trigger))
}

/// The first five whitespace-separated tokens of the lowercased text,
/// deduplicated. Callers must not rely on the ordering.
#[inline]
pub fn extract_key_terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .take(KEY_TERM_COUNT)
        .map(str::to_string)
        .unique()
        .collect()
}

#[derive(Debug, Clone)]
struct BufferEntry {
    #[allow(dead_code)]
    query: String,
    response: String,
    passage_hash: String,
}

/// Bounded record of recent turns and the passage sets that grounded them.
///
/// Invariant: every `passage_hash` referenced by an entry has a corresponding
/// cached passage set, and every cached set is referenced by at least one
/// entry. Lives for one guest session; reset on topic change.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    entries: VecDeque<BufferEntry>,
    cached_passages: HashMap<String, Vec<Passage>>,
    capacity: usize,
}

impl ConversationBuffer {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            cached_passages: HashMap::new(),
            capacity,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Build the retrieval query for a prompt. When the prompt is a follow-up
    /// and prior turns are buffered, the query is boosted with the union of
    /// key terms from every buffered response; otherwise the prompt passes
    /// through unchanged. Returns the query and whether boosting occurred.
    pub fn build_query(&self, prompt: &str) -> (String, bool) {
        if self.entries.is_empty() || !is_follow_up(prompt) {
            return (prompt.to_string(), false);
        }

        let mut seen = HashSet::new();
        let mut context_terms = Vec::new();
        for entry in &self.entries {
            for term in extract_key_terms(&entry.response) {
                if seen.insert(term.clone()) {
                    context_terms.push(term);
                }
            }
        }

        debug!(
            "Boosting follow-up query with {} context terms",
            context_terms.len()
        );
        (format!("{prompt} {}", context_terms.join(" ")), true)
    }

    /// Merge newly retrieved passages with every cached passage set. New
    /// passages take priority; duplicates by content are dropped (first
    /// occurrence wins) and the result is truncated to `limit`.
    pub fn merge_passages(&self, new_passages: Vec<Passage>, limit: usize) -> Vec<Passage> {
        new_passages
            .into_iter()
            .chain(
                self.cached_passages
                    .values()
                    .flat_map(|passages| passages.iter().cloned()),
            )
            .unique_by(|passage| passage.content.clone())
            .take(limit)
            .collect()
    }

    /// Record a completed turn and the passage set that grounded it, evicting
    /// the oldest entry beyond capacity. An evicted entry's cached passages
    /// are dropped unless another remaining entry shares the fingerprint.
    pub fn record(&mut self, query: &str, response: &str, passages: Vec<Passage>) {
        let passage_hash = fingerprint(&passages);

        self.entries.push_back(BufferEntry {
            query: query.to_string(),
            response: response.to_string(),
            passage_hash: passage_hash.clone(),
        });
        self.cached_passages.insert(passage_hash, passages);

        if self.entries.len() > self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                let still_referenced = self
                    .entries
                    .iter()
                    .any(|entry| entry.passage_hash == oldest.passage_hash);
                if !still_referenced {
                    self.cached_passages.remove(&oldest.passage_hash);
                }
            }
        }
    }

    /// Discard all buffered turns and cached passage sets (topic change).
    #[inline]
    pub fn reset(&mut self) {
        debug!("Resetting conversation buffer");
        self.entries.clear();
        self.cached_passages.clear();
    }

    #[cfg(test)]
    pub(crate) fn cached_fingerprints(&self) -> Vec<String> {
        self.cached_passages.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn referenced_fingerprints(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.passage_hash.clone())
            .collect()
    }
}
