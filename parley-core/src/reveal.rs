//! Cancellable typewriter reveal of assistant replies
//!
//! A reveal runs as its own task, emitting a growing prefix of the text on a
//! fixed interval. Cancelling stops it before the next frame; a cancelled
//! reveal never reports completion.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// One step of a reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealFrame {
    /// Text revealed so far
    pub visible: String,
    /// Set on the final frame
    pub done: bool,
}

/// Handle to a running reveal task.
#[derive(Debug)]
pub struct RevealHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl RevealHandle {
    /// Stop the reveal; no further frames are emitted.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the task to end (completed or cancelled).
    pub async fn join(self) {
        // The task only exits normally; a panic in `on_frame` is the caller's.
        let _ = self.join.await;
    }
}

/// Byte offsets at which each frame ends, stepping `chars_per_tick` chars.
fn frame_ends(text: &str, chars_per_tick: usize) -> Vec<usize> {
    let step = chars_per_tick.max(1);
    let mut ends: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(step)
        .step_by(step)
        .collect();
    ends.push(text.len());
    ends
}

/// Spawn a reveal of `text`.
///
/// `on_frame` is called from the reveal task for every frame, the last one
/// with `done` set. Empty text completes immediately.
pub fn spawn<F>(text: String, interval: Duration, chars_per_tick: usize, on_frame: F) -> RevealHandle
where
    F: Fn(RevealFrame) + Send + 'static,
{
    let token = CancellationToken::new();
    let task_token = token.clone();

    let join = tokio::spawn(async move {
        if text.is_empty() {
            on_frame(RevealFrame {
                visible: String::new(),
                done: true,
            });
            return;
        }

        let ends = frame_ends(&text, chars_per_tick);
        let last = ends.len() - 1;

        for (i, end) in ends.into_iter().enumerate() {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    trace!(frame = i, "Reveal cancelled");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
            if task_token.is_cancelled() {
                return;
            }
            on_frame(RevealFrame {
                visible: text[..end].to_string(),
                done: i == last,
            });
        }
    });

    RevealHandle { token, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<RevealFrame>>>, impl Fn(RevealFrame) + Send + 'static) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        (frames, move |frame| sink.lock().unwrap().push(frame))
    }

    #[test]
    fn frame_ends_respect_char_boundaries() {
        assert_eq!(frame_ends("abc", 1), vec![1, 2, 3]);
        assert_eq!(frame_ends("abcde", 2), vec![2, 4, 5]);
        // 'é' is two bytes
        assert_eq!(frame_ends("héllo", 2), vec![3, 5, 6]);
        assert_eq!(frame_ends("ab", 10), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_growing_prefixes_then_done() {
        let (frames, on_frame) = recorder();
        let handle = spawn("Hi!".to_string(), Duration::from_millis(30), 1, on_frame);
        handle.join().await;

        let frames = frames.lock().unwrap();
        let visible: Vec<&str> = frames.iter().map(|f| f.visible.as_str()).collect();
        assert_eq!(visible, vec!["H", "Hi", "Hi!"]);
        assert!(frames.last().unwrap().done);
        assert!(frames[..2].iter().all(|f| !f.done));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_before_next_frame() {
        let (frames, on_frame) = recorder();
        let handle = spawn("Hello there".to_string(), Duration::from_millis(30), 1, on_frame);

        tokio::time::sleep(Duration::from_millis(75)).await;
        handle.cancel();
        assert!(handle.is_cancelled());
        handle.join().await;

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| !f.done));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_completes_immediately() {
        let (frames, on_frame) = recorder();
        spawn(String::new(), Duration::from_secs(10), 1, on_frame).join().await;

        let frames = frames.lock().unwrap();
        assert_eq!(
            *frames,
            vec![RevealFrame {
                visible: String::new(),
                done: true
            }]
        );
    }
}
