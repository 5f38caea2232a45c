//! Stream consumer.
//!
//! Owns the single push connection of an in-flight assistant turn and the
//! text buffer it fills. Each raw payload is inspected before it is treated
//! as content:
//!
//! - exactly [`STREAM_END_SENTINEL`]: the turn is complete
//! - starts with [`STREAM_ERROR_PREFIX`]: the server reported an error
//! - anything else: a content token, appended verbatim
//!
//! The connection is read on a spawned task; payloads come back through a
//! channel tagged with the generation of the connection that produced them,
//! so nothing from a closed connection is ever applied.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::classify::user_message;
use crate::error::{DomainError, ErrorKind, TransportError};
use crate::types::SessionId;

/// Payload that marks the end of a reply.
pub const STREAM_END_SENTINEL: &str = "[STREAM_END]";

/// Prefix of a server-reported stream error.
pub const STREAM_ERROR_PREFIX: &str = "ERROR:";

/// What a raw payload means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame<'a> {
    Token(&'a str),
    End,
    /// Error text with the prefix removed
    Error(&'a str),
}

/// Classify one raw payload.
pub fn parse_frame(payload: &str) -> StreamFrame<'_> {
    if payload == STREAM_END_SENTINEL {
        StreamFrame::End
    } else if let Some(message) = payload.strip_prefix(STREAM_ERROR_PREFIX) {
        StreamFrame::Error(message)
    } else {
        StreamFrame::Token(payload)
    }
}

/// Outcome of applying one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// Content appended to the buffer
    Token(String),
    /// The reply finished; `text` is the whole buffer
    Completed { session_id: SessionId, text: String },
    /// The stream failed and was closed; the partial buffer was dropped
    Failed(DomainError),
}

#[derive(Debug)]
enum PushEvent {
    Data(String),
    Transport(TransportError),
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    event: PushEvent,
}

struct ActiveStream {
    generation: u64,
    session_id: SessionId,
    task: JoinHandle<()>,
}

/// Consumer of a single reply stream at a time.
pub struct StreamConsumer {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    active: Option<ActiveStream>,
    buffer: String,
    generation: u64,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            active: None,
            buffer: String::new(),
            generation: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Text received so far for the in-flight turn.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Open the reply stream for `session_id`.
    ///
    /// Any stream still open is closed first. Must be called from within a
    /// Tokio runtime.
    pub fn open(&mut self, api: Arc<dyn ChatApi>, session_id: &str, research_mode: bool) {
        if self.is_open() {
            warn!("Opening a reply stream while another is open; closing the old one");
            self.close();
        }

        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let stream_session = session_id.to_string();

        let task = tokio::spawn(async move {
            let send = |event: PushEvent| tx.send(Envelope { generation, event }).is_ok();

            let mut source = match api.open_stream(&stream_session, research_mode).await {
                Ok(source) => source,
                Err(e) => {
                    send(PushEvent::Transport(e));
                    return;
                }
            };

            while let Some(item) = source.next().await {
                match item {
                    Ok(payload) => {
                        let terminal = !matches!(parse_frame(&payload), StreamFrame::Token(_));
                        if !send(PushEvent::Data(payload)) || terminal {
                            return;
                        }
                    }
                    Err(e) => {
                        send(PushEvent::Transport(e));
                        return;
                    }
                }
            }

            send(PushEvent::Transport(TransportError::network(
                "Connection closed before the end-of-stream marker",
            )));
        });

        debug!(session_id, generation, research_mode, "Reply stream opened");
        self.active = Some(ActiveStream {
            generation,
            session_id: session_id.to_string(),
            task,
        });
    }

    /// Close the stream and drop any partial text. No-op when nothing is open.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            self.buffer.clear();
            debug!(generation = active.generation, "Reply stream closed");
        }
    }

    /// Wait for the next event of the open stream and apply it.
    ///
    /// Returns `None` once the consumer has no open stream. Cancel-safe.
    pub async fn next_outcome(&mut self) -> Option<StreamOutcome> {
        while self.is_open() {
            let envelope = self.rx.recv().await?;
            if let Some(outcome) = self.apply(envelope) {
                return Some(outcome);
            }
        }
        None
    }

    fn apply(&mut self, envelope: Envelope) -> Option<StreamOutcome> {
        let active = self.active.as_ref()?;
        if active.generation != envelope.generation {
            debug!(generation = envelope.generation, "Dropping event from a closed stream");
            return None;
        }

        let outcome = match envelope.event {
            PushEvent::Data(payload) => match parse_frame(&payload) {
                StreamFrame::Token(token) => {
                    self.buffer.push_str(token);
                    StreamOutcome::Token(token.to_string())
                }
                StreamFrame::End => {
                    let session_id = active.session_id.clone();
                    let text = std::mem::take(&mut self.buffer);
                    self.close();
                    StreamOutcome::Completed { session_id, text }
                }
                StreamFrame::Error(message) => {
                    let message = message.trim();
                    let message = if message.is_empty() {
                        user_message(ErrorKind::Stream)
                    } else {
                        message
                    };
                    let error = DomainError::stream(message)
                        .with_details(json!({ "source": "server", "payload": payload }));
                    self.close();
                    StreamOutcome::Failed(error)
                }
            },
            PushEvent::Transport(e) => {
                let error = DomainError::stream(user_message(ErrorKind::Stream)).with_details(json!({
                    "source": "transport",
                    "status": e.status,
                    "message": e.message,
                    "url": e.url,
                }));
                self.close();
                StreamOutcome::Failed(error)
            }
        };

        Some(outcome)
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChatApi, StreamScript};
    use std::time::Duration;

    fn api(mock: &MockChatApi) -> Arc<dyn ChatApi> {
        Arc::new(mock.clone())
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame("[STREAM_END]"), StreamFrame::End);
        assert_eq!(parse_frame("ERROR: boom"), StreamFrame::Error(" boom"));
        assert_eq!(parse_frame(" [STREAM_END]"), StreamFrame::Token(" [STREAM_END]"));
        assert_eq!(parse_frame("error: lowercase"), StreamFrame::Token("error: lowercase"));
        assert_eq!(parse_frame("Hi"), StreamFrame::Token("Hi"));
    }

    #[tokio::test]
    async fn test_tokens_then_completion() {
        let mock = MockChatApi::new().add_stream(StreamScript::tokens(&["Hi", " there"]).end());
        let mut consumer = StreamConsumer::new();
        consumer.open(api(&mock), "s-1", false);

        assert_eq!(consumer.next_outcome().await, Some(StreamOutcome::Token("Hi".into())));
        assert_eq!(consumer.buffer(), "Hi");
        assert_eq!(consumer.next_outcome().await, Some(StreamOutcome::Token(" there".into())));
        assert_eq!(
            consumer.next_outcome().await,
            Some(StreamOutcome::Completed {
                session_id: "s-1".into(),
                text: "Hi there".into()
            })
        );

        assert!(!consumer.is_open());
        assert_eq!(consumer.buffer(), "");
        assert_eq!(consumer.next_outcome().await, None);
    }

    #[tokio::test]
    async fn test_error_payload_fails_stream() {
        let mock = MockChatApi::new().add_stream(
            StreamScript::tokens(&["partial"]).error_payload(" No messages in session to respond to.\n"),
        );
        let mut consumer = StreamConsumer::new();
        consumer.open(api(&mock), "s-1", false);

        consumer.next_outcome().await;
        match consumer.next_outcome().await {
            Some(StreamOutcome::Failed(err)) => {
                assert_eq!(err.kind, ErrorKind::Stream);
                assert_eq!(err.message, "No messages in session to respond to.");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!consumer.is_open());
        assert_eq!(consumer.buffer(), "");
    }

    #[tokio::test]
    async fn test_transport_error_fails_stream() {
        let mock = MockChatApi::new().add_stream(
            StreamScript::tokens(&["a"]).transport_error(TransportError::network("reset by peer")),
        );
        let mut consumer = StreamConsumer::new();
        consumer.open(api(&mock), "s-1", true);

        consumer.next_outcome().await;
        let outcome = consumer.next_outcome().await;
        assert!(matches!(outcome, Some(StreamOutcome::Failed(ref e)) if e.kind == ErrorKind::Stream));
        assert!(!consumer.is_open());
    }

    #[tokio::test]
    async fn test_refused_connection_fails_stream() {
        let mock = MockChatApi::new().add_stream(StreamScript::refuse(TransportError::new(404, "gone")));
        let mut consumer = StreamConsumer::new();
        consumer.open(api(&mock), "s-1", false);

        let outcome = consumer.next_outcome().await;
        assert!(matches!(outcome, Some(StreamOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn test_body_ending_without_sentinel_fails_stream() {
        let mock = MockChatApi::new().add_stream(StreamScript::tokens(&["a", "b"]));
        let mut consumer = StreamConsumer::new();
        consumer.open(api(&mock), "s-1", false);

        consumer.next_outcome().await;
        consumer.next_outcome().await;
        assert!(matches!(consumer.next_outcome().await, Some(StreamOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn test_without_sentinel_stream_stays_open() {
        let mock =
            MockChatApi::new().add_stream(StreamScript::tokens(&["x", "y", "z"]).hold_open());
        let mut consumer = StreamConsumer::new();
        consumer.open(api(&mock), "s-1", false);

        for _ in 0..3 {
            assert!(matches!(consumer.next_outcome().await, Some(StreamOutcome::Token(_))));
        }
        let waited = tokio::time::timeout(Duration::from_millis(50), consumer.next_outcome()).await;
        assert!(waited.is_err());
        assert!(consumer.is_open());
        assert_eq!(consumer.buffer(), "xyz");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = MockChatApi::new()
            .add_stream(StreamScript::tokens(&["old"]).hold_open())
            .add_stream(StreamScript::tokens(&["new"]).end());
        let mut consumer = StreamConsumer::new();

        consumer.close();
        consumer.open(api(&mock), "s-1", false);
        assert_eq!(consumer.next_outcome().await, Some(StreamOutcome::Token("old".into())));
        consumer.close();
        assert_eq!(consumer.buffer(), "");
        consumer.close();
        assert!(!consumer.is_open());

        consumer.open(api(&mock), "s-1", false);
        assert_eq!(consumer.next_outcome().await, Some(StreamOutcome::Token("new".into())));
    }

    #[tokio::test]
    async fn test_reopen_closes_previous_stream() {
        let mock = MockChatApi::new()
            .add_stream(StreamScript::tokens(&["first"]).hold_open())
            .add_stream(StreamScript::tokens(&["second"]).end());
        let mut consumer = StreamConsumer::new();

        consumer.open(api(&mock), "s-1", false);
        assert_eq!(consumer.next_outcome().await, Some(StreamOutcome::Token("first".into())));

        consumer.open(api(&mock), "s-1", false);
        assert_eq!(consumer.buffer(), "");
        assert_eq!(consumer.next_outcome().await, Some(StreamOutcome::Token("second".into())));
        assert!(matches!(
            consumer.next_outcome().await,
            Some(StreamOutcome::Completed { ref text, .. }) if text == "second"
        ));
    }
}
