//! Chat-completions HTTP provider.
//!
//! Speaks the widely implemented `/chat/completions` wire format, buffered
//! or streamed as server-sent events.
//!
//! # Example
//!
//! ```ignore
//! use parley_models::auth::ApiKey;
//! use parley_models::providers::ChatCompletionsProvider;
//!
//! let provider = ChatCompletionsProvider::new()  // Uses api.openai.com
//!     .with_api_key(ApiKey::from_env("OPENAI_API_KEY")?);
//! let provider = ChatCompletionsProvider::with_base_url("http://localhost:8080/v1");
//! ```

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatRequest, ChatResponse, ChatStream, Message, StreamChunk, TextGenerator, Usage};
use crate::auth::ApiKey;
use crate::{Error, Result};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Payload marking the end of an SSE stream.
const DONE_MARKER: &str = "[DONE]";

// ────────────────────────────────────────────────────────────────────────────
// Wire Types
// ────────────────────────────────────────────────────────────────────────────

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Buffered response body.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<CompletionResponse> for ChatResponse {
    fn from(response: CompletionResponse) -> Self {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        Self { content, usage }
    }
}

/// One SSE event payload in streaming mode.
#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// SSE Decoding
// ────────────────────────────────────────────────────────────────────────────

/// Reassembles SSE lines that may be split across network chunks.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes, returning the `data:` payloads of all completed lines.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = Self::data_field(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that was not newline-terminated.
    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        Self::data_field(&line)
    }

    fn data_field(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?;
        Some(data.strip_prefix(' ').unwrap_or(data).to_string())
    }
}

/// Decode one SSE payload. `Ok(None)` means the event carried no text.
fn decode_event(data: &str) -> Result<Option<StreamChunk>> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_MARKER {
        return Ok(Some(StreamChunk::done()));
    }
    let chunk: CompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
        .map(StreamChunk::delta))
}

type Pending = VecDeque<Result<StreamChunk>>;

/// Queue decoded payloads; returns true once the stream should end.
fn enqueue(payloads: Vec<String>, pending: &mut Pending) -> bool {
    for data in payloads {
        match decode_event(&data) {
            Ok(Some(chunk)) => {
                let done = chunk.done;
                pending.push_back(Ok(chunk));
                if done {
                    return true;
                }
            }
            Ok(None) => {}
            Err(e) => {
                pending.push_back(Err(e));
                return true;
            }
        }
    }
    false
}

/// Turn a raw byte stream into a stream of decoded chunks.
fn sse_chunks<S, B, E>(bytes: S) -> ChatStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::default(), Pending::new(), false);
    let stream = futures_util::stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, decoder, pending, finished)));
                }
                if finished {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        finished = enqueue(decoder.push(chunk.as_ref()), &mut pending);
                    }
                    Some(Err(e)) => {
                        pending.push_back(Err(Error::Stream(e.to_string())));
                        finished = true;
                    }
                    None => {
                        enqueue(decoder.finish().into_iter().collect(), &mut pending);
                        finished = true;
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

// ────────────────────────────────────────────────────────────────────────────
// ChatCompletionsProvider
// ────────────────────────────────────────────────────────────────────────────

/// HTTP provider for chat-completions compatible services.
pub struct ChatCompletionsProvider {
    base_url: String,
    api_key: Option<ApiKey>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    /// Create a provider with the default base URL.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a provider with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Attach a bearer API key.
    #[must_use]
    pub fn with_api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the base URL for this provider.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            stream,
            "Sending chat completion request"
        );

        let mut builder = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }

        Ok(response)
    }
}

impl Default for ChatCompletionsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsProvider {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let response = self.send(&request, false).await?;
        let body = response.text().await?;
        let completion: CompletionResponse = serde_json::from_str(&body)?;
        Ok(completion.into())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let response = self.send(&request, true).await?;
        Ok(sse_chunks(response.bytes_stream()))
    }
}
