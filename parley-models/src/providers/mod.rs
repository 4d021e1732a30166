//! Text generator trait and implementations.
//!
//! The [`TextGenerator`] trait defines the unified interface for generation
//! services. Two response modes are supported: a fully buffered text
//! response, and a stream of text deltas ending in an end-of-stream marker.
//!
//! # Example
//!
//! ```ignore
//! use parley_models::providers::{ChatRequest, Message, TextGenerator, collect_stream};
//!
//! async fn greet(generator: &dyn TextGenerator) -> parley_models::Result<String> {
//!     let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("Hello!")]);
//!     let stream = generator.chat_stream(request).await?;
//!     collect_stream(stream).await
//! }
//! ```

mod chat_completions;
mod scripted;
mod types;

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::{Stream, StreamExt};

pub use chat_completions::{ChatCompletionsProvider, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use scripted::{ScriptedProvider, ScriptedReply};
pub use types::*;

use crate::Result;

/// A stream of response chunks for streaming responses.
///
/// This is a pinned, boxed stream that yields [`StreamChunk`] items or errors.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Trait for text generation services.
///
/// # Required Methods
///
/// - [`name`](TextGenerator::name) - Provider identifier
/// - [`chat`](TextGenerator::chat) - Buffered chat completion
/// - [`chat_stream`](TextGenerator::chat_stream) - Streaming chat completion
///
/// Transport failures (network errors, non-success status) are returned as
/// errors. Whether the returned text is usable is the caller's concern.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the provider name (e.g., "chat-completions", "scripted").
    fn name(&self) -> &str;

    /// Perform a buffered chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Perform a streaming chat completion request.
    ///
    /// The stream flag on the request will be set by the implementation.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream>;
}

/// Accumulate a stream of deltas into one string.
///
/// Stops at the end-of-stream marker or when the stream ends. An error
/// mid-stream aborts accumulation and is returned.
pub async fn collect_stream(mut stream: ChatStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.delta {
            text.push_str(&delta);
        }
        if chunk.done {
            break;
        }
    }
    Ok(text)
}
