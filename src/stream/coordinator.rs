//! Exchange coordinator.
//!
//! The coordinator owns the lifecycle of one question/reply exchange:
//!
//! 1. Resolve the session and record the user message
//! 2. Ask the [`ReplyGenerator`] for the complete reply
//! 3. Stream the reply as frames, accumulating what was sent
//! 4. Record the accumulated text as the assistant message after `[DONE]`
//!
//! What is stored is always exactly what was streamed. An exchange whose
//! stream is dropped early records nothing for the assistant.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use uuid::Uuid;

use super::{Frame, frames};
use crate::error::Result;
use crate::reply::ReplyGenerator;
use crate::session::{Message, SessionStore, TurnGuard};

/// Frames of one exchange, in order, ending with [`Frame::Done`].
pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// Lifecycle of a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Request received, nothing recorded yet.
    Init,
    /// User message recorded, waiting for the generator.
    AwaitingReply,
    /// Frames are being handed to the transport.
    Streaming,
    /// Assistant message recorded. Terminal.
    Committed,
}

impl ExchangeState {
    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::AwaitingReply)
                | (Self::AwaitingReply, Self::Streaming)
                | (Self::Streaming, Self::Streaming | Self::Committed)
        )
    }
}

/// Per-exchange bookkeeping. Logs a cancellation if dropped uncommitted.
#[derive(Debug)]
struct Exchange {
    exchange_id: String,
    session_id: String,
    state: ExchangeState,
    fragments: usize,
    _turn: TurnGuard,
}

impl Exchange {
    fn advance(&mut self, next: ExchangeState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        if self.state != next {
            tracing::debug!(
                exchange_id = %self.exchange_id,
                session_id = %self.session_id,
                from = ?self.state,
                to = ?next,
                "Exchange state changed"
            );
        }
        self.state = next;
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if self.state != ExchangeState::Committed {
            tracing::info!(
                exchange_id = %self.exchange_id,
                session_id = %self.session_id,
                state = ?self.state,
                fragments = self.fragments,
                "Exchange abandoned before commit"
            );
        }
    }
}

/// Runs question/reply exchanges against a session store.
#[derive(Debug, Clone)]
pub struct StreamCoordinator {
    sessions: SessionStore,
    generator: Arc<dyn ReplyGenerator>,
    pacing: Duration,
}

impl StreamCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(sessions: SessionStore, generator: Arc<dyn ReplyGenerator>, pacing: Duration) -> Self {
        Self {
            sessions,
            generator,
            pacing,
        }
    }

    /// The store this coordinator records into.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start an exchange and return its frame stream.
    ///
    /// The user message is recorded before the generator is called. If the
    /// generator fails, the error is returned, no frame is produced, and the
    /// user message stays in history without a reply.
    ///
    /// The assistant message is recorded only when the stream is polled past
    /// its final [`Frame::Done`]. Dropping the stream earlier records
    /// nothing. Exchanges on the same session run one at a time.
    #[tracing::instrument(
        name = "exchange",
        skip(self, question),
        fields(exchange_id = tracing::field::Empty, question_length = question.len())
    )]
    pub async fn start_exchange(&self, session_id: &str, question: &str) -> Result<FrameStream> {
        let exchange_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("exchange_id", exchange_id.as_str());

        let session = self.sessions.get_or_create(session_id);
        let turn = session.begin_turn().await;
        let mut exchange = Exchange {
            exchange_id,
            session_id: session_id.to_string(),
            state: ExchangeState::Init,
            fragments: 0,
            _turn: turn,
        };

        self.sessions.append(session_id, Message::user(question))?;
        exchange.advance(ExchangeState::AwaitingReply);

        let reply = match self.generator.generate(question).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Reply generation failed");
                return Err(e.into());
            }
        };
        exchange.advance(ExchangeState::Streaming);

        tracing::info!(reply_length = reply.len(), "Streaming reply");

        let sessions = self.sessions.clone();
        let pacing = self.pacing;

        Ok(Box::pin(async_stream::stream! {
            let mut exchange = exchange;
            let mut accumulated = String::with_capacity(reply.len());

            let frames = frames(reply, pacing);
            futures::pin_mut!(frames);

            while let Some(frame) = frames.next().await {
                let done = frame.is_done();
                if let Frame::Fragment(text) = &frame {
                    accumulated.push_str(text);
                    exchange.fragments += 1;
                    exchange.advance(ExchangeState::Streaming);
                }

                yield frame;

                if done {
                    let content_length = accumulated.len();
                    let message = Message::assistant(std::mem::take(&mut accumulated));
                    match sessions.append(&exchange.session_id, message) {
                        Ok(()) => {
                            exchange.advance(ExchangeState::Committed);
                            tracing::info!(
                                exchange_id = %exchange.exchange_id,
                                session_id = %exchange.session_id,
                                fragments = exchange.fragments,
                                content_length,
                                "Committed assistant reply"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                exchange_id = %exchange.exchange_id,
                                error = %e,
                                "Failed to commit assistant reply"
                            );
                        }
                    }
                    break;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::{CannedReplies, ReplyError};
    use crate::session::MessageRole;

    #[derive(Debug)]
    struct FixedReply(&'static str);

    #[async_trait::async_trait]
    impl ReplyGenerator for FixedReply {
        async fn generate(&self, _question: &str) -> std::result::Result<String, ReplyError> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait::async_trait]
    impl ReplyGenerator for Broken {
        async fn generate(&self, _question: &str) -> std::result::Result<String, ReplyError> {
            Err(ReplyError::Unavailable("offline".to_string()))
        }
    }

    fn coordinator(generator: Arc<dyn ReplyGenerator>) -> StreamCoordinator {
        StreamCoordinator::new(SessionStore::new(), generator, Duration::ZERO)
    }

    fn fragments_text(frames: &[Frame]) -> String {
        frames
            .iter()
            .filter(|f| !f.is_done())
            .map(Frame::payload)
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        use ExchangeState as S;

        assert!(S::Init.can_advance_to(S::AwaitingReply));
        assert!(S::AwaitingReply.can_advance_to(S::Streaming));
        assert!(S::Streaming.can_advance_to(S::Streaming));
        assert!(S::Streaming.can_advance_to(S::Committed));

        assert!(!S::Init.can_advance_to(S::Streaming));
        assert!(!S::AwaitingReply.can_advance_to(S::Committed));
        assert!(!S::Committed.can_advance_to(S::Streaming));
        assert!(!S::Committed.can_advance_to(S::Init));
    }

    #[tokio::test]
    async fn test_greeting_scenario() {
        let coord = coordinator(Arc::new(CannedReplies::default()));
        let greeting = CannedReplies::default().reply_for("你好");

        let frames: Vec<Frame> = coord
            .start_exchange("s1", "你好")
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(frames.len(), greeting.chars().count() + 1);
        assert_eq!(frames.last(), Some(&Frame::Done));
        assert_eq!(fragments_text(&frames), greeting);

        assert_eq!(
            coord.sessions().history("s1"),
            vec![Message::user("你好"), Message::assistant(greeting)]
        );
    }

    #[tokio::test]
    async fn test_fallback_scenario() {
        let coord = coordinator(Arc::new(CannedReplies::default()));

        let frames: Vec<Frame> = coord
            .start_exchange("s1", "xyz")
            .await
            .unwrap()
            .collect()
            .await;

        let streamed = fragments_text(&frames);
        assert!(streamed.contains("xyz"));

        let history = coord.sessions().history("s1");
        assert_eq!(history[1].content, streamed);
        assert!(history[1].content.contains("xyz"));
    }

    #[tokio::test]
    async fn test_committed_content_matches_stream() {
        let coord = coordinator(Arc::new(FixedReply("line one\nline two ✓")));

        let frames: Vec<Frame> = coord
            .start_exchange("s", "q")
            .await
            .unwrap()
            .collect()
            .await;

        let last = coord.sessions().history("s").pop().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.content, fragments_text(&frames));
        assert!(!last.content.contains("[DONE]"));
    }

    #[tokio::test]
    async fn test_empty_reply_commits_empty_message() {
        let coord = coordinator(Arc::new(FixedReply("")));

        let frames: Vec<Frame> = coord
            .start_exchange("s", "q")
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(frames, vec![Frame::Done]);
        assert_eq!(
            coord.sessions().history("s"),
            vec![Message::user("q"), Message::assistant("")]
        );
    }

    #[tokio::test]
    async fn test_user_message_recorded_before_reply() {
        let coord = coordinator(Arc::new(FixedReply("abc")));

        let stream = coord.start_exchange("s", "q").await.unwrap();
        assert_eq!(coord.sessions().history("s"), vec![Message::user("q")]);

        let _: Vec<Frame> = stream.collect().await;
        assert_eq!(coord.sessions().history("s").len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_stream_is_not_committed() {
        let coord = coordinator(Arc::new(FixedReply("abcdef")));

        let mut stream = coord.start_exchange("s", "q").await.unwrap();
        assert_eq!(stream.next().await, Some(Frame::fragment("a")));
        assert_eq!(stream.next().await, Some(Frame::fragment("b")));
        drop(stream);

        assert_eq!(coord.sessions().history("s"), vec![Message::user("q")]);

        // The session is usable again after the abandoned exchange.
        let _: Vec<Frame> = coord
            .start_exchange("s", "again")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            coord.sessions().history("s"),
            vec![
                Message::user("q"),
                Message::user("again"),
                Message::assistant("abcdef"),
            ]
        );
    }

    #[tokio::test]
    async fn test_sentinel_seen_but_not_polled_past() {
        let coord = coordinator(Arc::new(FixedReply("a")));

        let mut stream = coord.start_exchange("s", "q").await.unwrap();
        assert_eq!(stream.next().await, Some(Frame::fragment("a")));
        assert_eq!(stream.next().await, Some(Frame::Done));
        assert_eq!(coord.sessions().history("s").len(), 1);

        assert_eq!(stream.next().await, None);
        assert_eq!(coord.sessions().history("s").len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_user_message() {
        let coord = coordinator(Arc::new(Broken));

        let err = coord.start_exchange("s", "q").await.err().unwrap();
        assert!(matches!(err, crate::error::Error::Reply(_)));
        assert_eq!(coord.sessions().history("s"), vec![Message::user("q")]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let coord = coordinator(Arc::new(FixedReply("r")));

        let _: Vec<Frame> = coord.start_exchange("a", "qa").await.unwrap().collect().await;
        let _: Vec<Frame> = coord.start_exchange("b", "qb").await.unwrap().collect().await;

        let a = coord.sessions().history("a");
        let b = coord.sessions().history("b");
        assert_eq!(a, vec![Message::user("qa"), Message::assistant("r")]);
        assert_eq!(b, vec![Message::user("qb"), Message::assistant("r")]);
    }

    #[tokio::test]
    async fn test_same_session_exchanges_do_not_interleave() {
        let coord = coordinator(Arc::new(FixedReply("xy")));

        let mut first = coord.start_exchange("s", "one").await.unwrap();
        assert_eq!(first.next().await, Some(Frame::fragment("x")));

        let second_coord = coord.clone();
        let second = tokio::spawn(async move {
            let stream = second_coord.start_exchange("s", "two").await.unwrap();
            stream.collect::<Vec<Frame>>().await
        });
        tokio::task::yield_now().await;

        // The second question waits until the first reply is committed.
        assert_eq!(coord.sessions().history("s"), vec![Message::user("one")]);

        let rest: Vec<Frame> = first.collect().await;
        assert_eq!(rest, vec![Frame::fragment("y"), Frame::Done]);
        second.await.unwrap();

        assert_eq!(
            coord.sessions().history("s"),
            vec![
                Message::user("one"),
                Message::assistant("xy"),
                Message::user("two"),
                Message::assistant("xy"),
            ]
        );
    }
}
