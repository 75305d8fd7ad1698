//! Conversation turn orchestration.
//!
//! Sequences one round-trip: build context, invoke the completion API,
//! stream output, persist, update the conversation buffer. Retrieval and
//! completion failures are recovered at the turn level with a generic notice;
//! persistence failures at the write level. Nothing is retried.

#[cfg(test)]
mod tests;

use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, error};

use crate::completion::{ChatMessage, CompletionBackend, Role};
use crate::config::{AppConfig, RetrievalConfig};
use crate::retrieval::Retriever;
use crate::session::SessionContext;
use crate::storage::MessageStore;

/// How many trailing session messages accompany each completion request.
pub const HISTORY_WINDOW: usize = 12;

/// Cap on the chat input length, enforced by the UI surface.
pub const MAX_INPUT_CHARS: usize = 500;

pub const GENERIC_FAILURE_NOTICE: &str = "Oops! Something went wrong. Please try again.";

const WELCOME_INSTRUCTION: &str = "Introduce yourself and your purpose.";

/// Outcome of one turn. `response` is the full assistant message on success;
/// `notices` are user-visible error lines (generic turn failure, inline
/// persistence errors).
#[derive(Debug, Default)]
pub struct TurnReport {
    pub response: Option<String>,
    pub notices: Vec<String>,
}

pub struct ChatEngine {
    store: Arc<dyn MessageStore>,
    retriever: Arc<dyn Retriever>,
    completion: Arc<dyn CompletionBackend>,
    app_name: String,
    website: String,
    num_results: usize,
}

impl ChatEngine {
    #[inline]
    pub fn new(
        store: Arc<dyn MessageStore>,
        retriever: Arc<dyn Retriever>,
        completion: Arc<dyn CompletionBackend>,
        app: &AppConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            completion,
            app_name: app.name.clone(),
            website: app.website.clone(),
            num_results: retrieval.num_results,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are {name}, an AI assistant for the business.
- Use "The Knowledge" section as your primary information source
- Only consult internal knowledge when:
  * The question is not directly related to the business but is not off-topic AND
  * The answer isn't in "The Knowledge" AND
  * You're certain the information is accurate AND current
- If unsure, information might be outdated, or question is ambiguous:
  * Either respond using only "The Knowledge" section (if relevant) OR
  * State: "I don't have information on that. Please rephrase your question for clarity."
- Never mention "The Knowledge" section or internal knowledge
- Prioritize accuracy over completeness
- Keep responses under 5 sentences
- For completely unknown topics: "I don't have information on that yet. Visit our website {website} for more information.""#,
            name = self.app_name,
            website = self.website,
        )
    }

    /// Produce the lazily-sent welcome turn: empty prompt, retrieval skipped,
    /// response queued as unsaved until the guest's first real input.
    pub async fn welcome(
        &self,
        ctx: &mut SessionContext,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnReport {
        if ctx.welcome_sent() {
            return TurnReport::default();
        }
        ctx.mark_welcome_sent();

        let mut notices = Vec::new();
        let response = self
            .generate(ctx, "", Some(WELCOME_INSTRUCTION), on_delta, &mut notices)
            .await;

        if let Some(response) = &response {
            ctx.push_assistant(response.clone());
            ctx.set_unsaved_welcome(response.clone());
        }

        TurnReport { response, notices }
    }

    /// Handle one real user turn end to end.
    pub async fn submit(
        &self,
        ctx: &mut SessionContext,
        prompt: &str,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnReport {
        let mut notices = Vec::new();

        let Some(guest_id) = ctx.guest_id().map(str::to_string) else {
            notices.push("No active guest session".to_string());
            return TurnReport {
                response: None,
                notices,
            };
        };

        // Topic change: discard carried context before the new retrieval
        if !crate::context::is_follow_up(prompt) && !ctx.buffer.is_empty() {
            ctx.buffer.reset();
        }

        // First real input: flush the queued welcome so the persisted order
        // is welcome first, then each user/assistant pair in turn order
        if let Some(welcome) = ctx.take_unsaved_welcome() {
            if let Err(e) = self.store.append(&guest_id, Role::Assistant, &welcome).await {
                error!("Failed to persist welcome message: {e:#}");
                notices.push(format!("Error saving message: {e:#}"));
            }
        }

        ctx.push_user(prompt);
        if let Err(e) = self.store.append(&guest_id, Role::User, prompt).await {
            error!("Failed to persist user message: {e:#}");
            notices.push(format!("Error saving message: {e:#}"));
        }

        let response = self.generate(ctx, prompt, None, on_delta, &mut notices).await;

        if let Some(response) = &response {
            ctx.push_assistant(response.clone());
            if let Err(e) = self
                .store
                .append(&guest_id, Role::Assistant, response)
                .await
            {
                error!("Failed to persist assistant message: {e:#}");
                notices.push(format!("Error saving message: {e:#}"));
            }
        }

        TurnReport { response, notices }
    }

    /// Build knowledge context, stream one completion, and update the buffer
    /// on success. Returns the full response, or `None` when the turn failed
    /// (a generic notice is pushed and nothing is recorded).
    async fn generate(
        &self,
        ctx: &mut SessionContext,
        prompt: &str,
        additional_instructions: Option<&str>,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
        notices: &mut Vec<String>,
    ) -> Option<String> {
        let mut passages = Vec::new();

        // An empty prompt (the synthetic welcome turn) skips retrieval
        if !prompt.is_empty() {
            let (query, boosted) = ctx.buffer.build_query(prompt);
            debug!("Retrieval query (boosted: {boosted}): {query}");

            let retrieved = match self.retriever.retrieve(&query, self.num_results).await {
                Ok(retrieved) => retrieved,
                Err(e) => {
                    error!("Retrieval failed: {e:#}");
                    notices.push(GENERIC_FAILURE_NOTICE.to_string());
                    return None;
                }
            };

            passages = if boosted {
                ctx.buffer.merge_passages(retrieved, self.num_results)
            } else {
                retrieved
            };
        }

        let knowledge = passages
            .iter()
            .map(|passage| passage.content.as_str())
            .join("\n\n");

        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::system(format!("Relevant knowledge:\n{knowledge}")),
        ];
        messages.extend_from_slice(ctx.recent_history(HISTORY_WINDOW));
        if let Some(instructions) = additional_instructions {
            messages.push(ChatMessage::system(instructions));
        }

        let full_response = match self.completion.stream_chat(&messages, on_delta).await {
            Ok(full_response) => full_response,
            Err(e) => {
                error!("Error in AI response: {e:#}");
                notices.push(GENERIC_FAILURE_NOTICE.to_string());
                return None;
            }
        };

        // Carry context forward only when retrieval actually grounded the turn
        if !prompt.is_empty() && !passages.is_empty() {
            ctx.buffer.record(prompt, &full_response, passages);
        }

        Some(full_response)
    }
}
