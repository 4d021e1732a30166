//! Scripted provider for tests and offline play
//!
//! ScriptedProvider replays queued replies in order, enabling fast,
//! deterministic testing of everything built on [`TextGenerator`].
//! Buffered and streamed calls share one queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ChatStream, StreamChunk, TextGenerator};
use crate::{Error, Result};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Whole text; streamed as a single delta.
    Text(String),
    /// Deltas for streaming; joined for buffered calls.
    Deltas(Vec<String>),
    /// Fail the call with this error.
    Fail(Error),
}

impl ScriptedReply {
    /// Convenience constructor for text replies.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

type Responder = Arc<dyn Fn(&ChatRequest) -> ScriptedReply + Send + Sync>;

/// In-memory [`TextGenerator`] that replays queued replies.
///
/// Queue replies with `queue()` before making calls. Each call consumes one
/// reply; when the queue is empty the responder (if any) is asked instead,
/// otherwise the call fails with a request error.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    /// Create an empty scripted provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add artificial latency before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer from a closure once the queue runs dry.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> ScriptedReply + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Queue a reply to be returned by the next call.
    pub fn queue(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Queue a text reply (convenience method).
    pub fn queue_text(&self, text: impl Into<String>) {
        self.queue(ScriptedReply::Text(text.into()));
    }

    /// Queue a failure (convenience method).
    pub fn queue_error(&self, error: Error) {
        self.queue(ScriptedReply::Fail(error));
    }

    /// Number of replies still queued.
    pub fn queued_count(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of calls made so far (buffered and streamed).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn next_reply(&self, request: &ChatRequest) -> Result<ScriptedReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (queued, &self.responder) {
            (Some(reply), _) => Ok(reply),
            (None, Some(responder)) => Ok(responder(request)),
            (None, None) => Err(Error::Request("no scripted reply queued".to_string())),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        match self.next_reply(&request).await? {
            ScriptedReply::Text(text) => Ok(ChatResponse::text(text)),
            ScriptedReply::Deltas(parts) => Ok(ChatResponse::text(parts.concat())),
            ScriptedReply::Fail(err) => Err(err),
        }
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let parts = match self.next_reply(&request.stream()).await? {
            ScriptedReply::Text(text) => vec![text],
            ScriptedReply::Deltas(parts) => parts,
            ScriptedReply::Fail(err) => return Err(err),
        };

        let chunks: Vec<Result<StreamChunk>> = parts
            .into_iter()
            .map(|part| Ok(StreamChunk::delta(part)))
            .chain(std::iter::once(Ok(StreamChunk::done())))
            .collect();
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Message, collect_stream};
    use std::time::Instant;

    fn request() -> ChatRequest {
        ChatRequest::new("test-model", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn replays_queue_in_order() {
        let provider = ScriptedProvider::new();
        provider.queue_text("first");
        provider.queue_text("second");

        assert_eq!(provider.chat(request()).await.unwrap().content, "first");
        assert_eq!(provider.chat(request()).await.unwrap().content, "second");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.queued_count(), 0);
    }

    #[tokio::test]
    async fn empty_queue_without_responder_fails() {
        let provider = ScriptedProvider::new();
        let err = provider.chat(request()).await.unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[tokio::test]
    async fn responder_answers_when_queue_is_empty() {
        let provider = ScriptedProvider::new()
            .with_responder(|req| ScriptedReply::text(format!("{} msgs", req.messages.len())));
        assert_eq!(provider.chat(request()).await.unwrap().content, "1 msgs");
    }

    #[tokio::test]
    async fn streams_deltas_with_done_marker() {
        let provider = ScriptedProvider::new();
        provider.queue(ScriptedReply::Deltas(vec!["Hel".into(), "lo".into()]));

        let stream = provider.chat_stream(request()).await.unwrap();
        assert_eq!(collect_stream(stream).await.unwrap(), "Hello");
        assert!(provider.requests()[0].stream);
    }

    #[tokio::test]
    async fn queued_failure_is_returned() {
        let provider = ScriptedProvider::new();
        provider.queue_error(Error::Status {
            status: 500,
            body: "boom".to_string(),
        });
        assert!(provider.chat_stream(request()).await.is_err());
    }

    #[tokio::test]
    async fn delay_is_applied() {
        let provider = ScriptedProvider::new().with_delay(Duration::from_millis(30));
        provider.queue_text("slow");

        let start = Instant::now();
        provider.chat(request()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
