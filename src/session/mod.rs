//! Per-guest session state.
//!
//! One `SessionContext` per chat invocation, strictly partitioned by guest
//! identifier. The session itself is never persisted; only its user and
//! assistant messages are mirrored into durable storage.

#[cfg(test)]
mod tests;

use chrono::Utc;
use uuid::Uuid;

use crate::completion::ChatMessage;
use crate::context::ConversationBuffer;

/// Session-scoped token identifying one visitor's conversation:
/// a minute-resolution timestamp prefix plus a random suffix.
#[inline]
pub fn generate_guest_id() -> String {
    let prefix = Utc::now().format("%y%m%d%H%M");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..6])
}

/// Explicit per-session context passed through the orchestration; no ambient
/// global state.
///
/// Lifecycle: Unauthenticated (`guest_id` unset) until `start_session`, then
/// Active for the rest of the session. There is no transition back.
#[derive(Debug, Clone)]
pub struct SessionContext {
    guest_id: Option<String>,
    messages: Vec<ChatMessage>,
    welcome_sent: bool,
    unsaved_welcome: Option<String>,
    pub buffer: ConversationBuffer,
}

impl SessionContext {
    #[inline]
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            guest_id: None,
            messages: Vec::new(),
            welcome_sent: false,
            unsaved_welcome: None,
            buffer: ConversationBuffer::new(buffer_capacity),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.guest_id.is_some()
    }

    #[inline]
    pub fn guest_id(&self) -> Option<&str> {
        self.guest_id.as_deref()
    }

    /// Transition Unauthenticated → Active, assigning a fresh guest id.
    /// Idempotent once active: the existing id is kept.
    #[inline]
    pub fn start_session(&mut self) -> &str {
        if self.guest_id.is_none() {
            self.guest_id = Some(generate_guest_id());
        }
        self.guest_id.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The last `limit` messages, oldest first.
    #[inline]
    pub fn recent_history(&self, limit: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    #[inline]
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    #[inline]
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    #[inline]
    pub fn welcome_sent(&self) -> bool {
        self.welcome_sent
    }

    /// Queue the welcome message as unsaved; it is flushed to durable storage
    /// before the guest's first real input is recorded.
    #[inline]
    pub fn set_unsaved_welcome(&mut self, message: impl Into<String>) {
        self.welcome_sent = true;
        self.unsaved_welcome = Some(message.into());
    }

    /// Mark the welcome as sent even when no response was produced, so the
    /// synthetic turn is not repeated.
    #[inline]
    pub fn mark_welcome_sent(&mut self) {
        self.welcome_sent = true;
    }

    #[inline]
    pub fn take_unsaved_welcome(&mut self) -> Option<String> {
        self.unsaved_welcome.take()
    }
}
