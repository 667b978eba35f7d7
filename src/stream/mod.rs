//! Incremental delivery of replies.
//!
//! A complete reply is cut into [`Frame`]s, one per character, followed by a
//! single terminal [`Frame::Done`]. The [`coordinator`] drives a session
//! exchange through these frames and records the reply once the last frame
//! has been handed to the transport; [`sse`] defines the wire encoding.
//!
//! # Example
//!
//! ```rust
//! use chat_stream::stream::{Frame, frames};
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let out: Vec<Frame> = frames("hi".to_string(), Duration::ZERO).collect().await;
//! assert_eq!(
//!     out,
//!     vec![Frame::fragment("h"), Frame::fragment("i"), Frame::Done]
//! );
//! # });
//! ```

pub mod coordinator;
pub mod sse;

pub use coordinator::{ExchangeState, FrameStream, StreamCoordinator};

use std::time::Duration;

use futures::Stream;

/// Payload of the terminal frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One unit of incremental output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A piece of reply text.
    Fragment(String),
    /// End of the reply. Always last, always exactly once.
    Done,
}

impl Frame {
    /// Create a fragment frame.
    #[must_use]
    pub fn fragment(text: impl Into<String>) -> Self {
        Self::Fragment(text.into())
    }

    /// Text carried on the wire for this frame.
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::Fragment(text) => text,
            Self::Done => DONE_SENTINEL,
        }
    }

    /// Whether this is the terminal frame.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Cut a reply into paced frames.
///
/// Yields one fragment per `char` of `reply`, in order, sleeping for
/// `pacing` after each, then a single [`Frame::Done`]. An empty reply
/// yields only `Done`. A zero `pacing` never sleeps.
pub fn frames(reply: String, pacing: Duration) -> impl Stream<Item = Frame> + Send + 'static {
    async_stream::stream! {
        for ch in reply.chars() {
            yield Frame::Fragment(ch.to_string());
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }
        yield Frame::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_one_fragment_per_char_then_done() {
        let reply = "你好呀！😊 ok";
        let out: Vec<Frame> = frames(reply.to_string(), Duration::ZERO).collect().await;

        assert_eq!(out.len(), reply.chars().count() + 1);
        assert_eq!(out.last(), Some(&Frame::Done));
        assert_eq!(out.iter().filter(|f| f.is_done()).count(), 1);

        let rebuilt: String = out
            .iter()
            .filter(|f| !f.is_done())
            .map(Frame::payload)
            .collect();
        assert_eq!(rebuilt, reply);

        // Multi-byte characters are never split.
        assert_eq!(out[0], Frame::fragment("你"));
        assert_eq!(out[4], Frame::fragment("😊"));
    }

    #[tokio::test]
    async fn test_empty_reply_yields_only_done() {
        let out: Vec<Frame> = frames(String::new(), Duration::ZERO).collect().await;
        assert_eq!(out, vec![Frame::Done]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_fragments() {
        let pacing = Duration::from_millis(50);
        let start = tokio::time::Instant::now();

        let stream = frames("abc".to_string(), pacing);
        futures::pin_mut!(stream);

        assert_eq!(stream.next().await, Some(Frame::fragment("a")));
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert_eq!(stream.next().await, Some(Frame::fragment("b")));
        assert!(start.elapsed() >= pacing);

        assert_eq!(stream.next().await, Some(Frame::fragment("c")));
        assert_eq!(stream.next().await, Some(Frame::Done));
        assert!(start.elapsed() >= pacing * 3);

        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_payload() {
        assert_eq!(Frame::fragment("x").payload(), "x");
        assert_eq!(Frame::Done.payload(), "[DONE]");
    }
}
