//! Streaming chat-completion client for OpenAI-compatible endpoints.
//!
//! The hosted API receives an ordered role/content message list and streams
//! back text deltas as server-sent events, terminated by a `[DONE]` marker.


use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::CompletionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(anyhow!("Unknown message role: {other}")),
        }
    }
}

/// One entry in the message list sent to the completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Boundary to the hosted completion API. Each delta is handed to `on_delta`
/// in arrival order; the accumulated full response is returned once the
/// stream completes.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionClient {
    #[inline]
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let base = config
            .base_url()
            .context("Failed to parse completion base URL from config")?;

        let endpoint = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Extract the text delta from one SSE `data:` payload, if any.
    fn parse_event(payload: &str) -> Result<Option<String>> {
        let chunk: StreamChunk =
            serde_json::from_str(payload).context("Failed to parse completion stream event")?;

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty()))
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        debug!(
            "Requesting streamed completion for {} messages with model {}",
            messages.len(),
            self.model
        );

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Completion API returned HTTP {status}: {}",
                body.trim()
            ));
        }

        let mut full_response = String::new();
        let mut pending = Vec::new();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read completion stream")?;
            pending.extend_from_slice(&chunk);

            // Process every complete line buffered so far; a delta split
            // across transport chunks stays in `pending` until its newline
            // arrives.
            while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();

                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();

                if payload == "[DONE]" {
                    break 'outer;
                }

                if let Some(text) = Self::parse_event(payload)? {
                    full_response.push_str(&text);
                    on_delta(&text);
                }
            }
        }

        debug!(
            "Completion stream finished ({} chars)",
            full_response.len()
        );
        Ok(full_response.trim().to_string())
    }
}
