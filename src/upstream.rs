//! Upstream chat-completions client
//!
//! Wire types and the HTTP client for the `/chat/completions` endpoint.
//! Responses are consumed as a server-sent-event byte stream; the
//! [`SseBuffer`] extracts complete `data:` payloads from arbitrarily
//! chunked network reads.

use crate::error::{Result, TalariaError};
use crate::storage::Role;
use serde::{Deserialize, Serialize};

/// Hard output ceiling enforced by the provider; requested max_tokens is
/// clamped to this before the request is built.
pub const PROVIDER_MAX_OUTPUT_TOKENS: usize = 64_000;

/// How much of an upstream error body is carried in the error
const ERROR_BODY_MAX_CHARS: usize = 500;

/// A message in the outbound request body
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    /// Role tag understood by the upstream API
    pub role: Role,
    /// Message text
    pub content: String,
}

impl OutboundMessage {
    /// Creates an outbound message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Request body for a streaming chat completion
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Ordered outbound message list
    pub messages: Vec<OutboundMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling parameter
    pub top_p: f32,
    /// Maximum output tokens (already clamped to the provider ceiling)
    pub max_tokens: usize,
    /// Always true; the relay only speaks the streaming protocol
    pub stream: bool,
}

/// One parsed SSE fragment of a streaming response
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    /// Completion choices; only the first is consumed
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

/// A single choice within a stream fragment
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    /// Incremental content delta
    #[serde(default)]
    pub delta: StreamDelta,
}

/// Incremental delta carried by a stream fragment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    /// New content characters, when the fragment carries any
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Returns the content delta of the first choice, if any
    pub fn delta_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }
}

/// HTTP client for the upstream chat-completions endpoint
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    /// Creates a client with the given endpoint, credential, and deadline
    ///
    /// The timeout covers the entire streaming request; exceeding it maps
    /// to [`TalariaError::Timeout`].
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(TalariaError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Issues a streaming chat-completion request
    ///
    /// Returns the open response for the caller to consume as a byte
    /// stream. A non-2xx status maps to [`TalariaError::Upstream`] with
    /// the code and a truncated body; nothing is retried.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            let body: String = body.chars().take(ERROR_BODY_MAX_CHARS).collect();
            return Err(TalariaError::Upstream {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(response)
    }
}

/// Maps a reqwest error to the relay taxonomy
pub(crate) fn classify_request_error(e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        TalariaError::Timeout.into()
    } else {
        TalariaError::Http(e).into()
    }
}

/// Accumulates raw SSE bytes and yields complete `data:` payloads
///
/// Events are separated by blank lines; a single event block may carry
/// multiple field lines, of which only `data:` lines are payloads. The
/// buffer tolerates payloads split across network chunks.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns any completed payloads
    ///
    /// Non-UTF-8 chunks are replaced lossily; non-`data:` field lines are
    /// dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let event_block = self.buffer[..pos].to_string();
            self.buffer = self.buffer[pos + 2..].to_string();

            for line in event_block.lines() {
                if let Some(value) = line.strip_prefix("data:") {
                    payloads.push(value.trim().to_string());
                }
            }
        }

        payloads
    }

    /// Drains any trailing partial event once the stream has ended
    pub fn finish(&mut self) -> Vec<String> {
        let remainder = std::mem::take(&mut self.buffer);
        remainder
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|value| value.trim().to_string())
            .collect()
    }
}
