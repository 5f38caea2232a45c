//! Server-sent events decoding.
//!
//! Only the `data` field matters to the chat stream; `event`, `id`, `retry`
//! and comment lines are skipped.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};

use crate::api::ApiResult;
use crate::error::TransportError;

/// Incremental SSE decoder.
///
/// Accepts arbitrary chunk boundaries, including ones that split a line or a
/// UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning the payloads of every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if let Some(event) = self.process_line(&line) {
                    events.push(event);
                }
            } else {
                self.line.push(byte);
            }
        }
        events
    }

    /// Flush an event left unterminated when the body ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.line.is_empty() {
            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line[0] == b':' {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.find(':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (&line[..], ""),
        };

        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a raw body byte stream into a stream of event payloads.
///
/// A body error is yielded once as `Err` and ends the stream.
pub fn decode_events<S, B, E>(body: S) -> impl Stream<Item = ApiResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<TransportError> + Send,
{
    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.finished = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data: Hi\n\n"), vec!["Hi"]);
    }

    #[test]
    fn test_only_one_leading_space_is_stripped() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data:  there\n\n"), vec![" there"]);
        assert_eq!(decoder.feed(b"data:tight\n\n"), vec!["tight"]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\r\n").is_empty());
        assert_eq!(decoder.feed(b"\r\n"), vec!["hello"]);
    }

    #[test]
    fn test_split_utf8_sequence() {
        let text = "data: こんにちは\n\n".as_bytes();
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(&text[..8]);
        events.extend(decoder.feed(&text[8..]));
        assert_eq!(events, vec!["こんにちは"]);
    }

    #[test]
    fn test_multiline_data_and_ignored_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: token\nid: 7\ndata: line one\ndata: line two\n\n");
        assert_eq!(events, vec!["line one\nline two"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [STREAM_END]").is_empty());
        assert_eq!(decoder.finish(), Some("[STREAM_END]".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_decode_events_over_chunks() {
        let chunks: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"data: Hi\n\nda".to_vec()),
            Ok(b"ta:  there\n\n".to_vec()),
            Ok(b"data: [STREAM_END]\n\n".to_vec()),
        ];

        let payloads: Vec<_> = decode_events(futures::stream::iter(chunks))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(payloads, vec!["Hi", " there", "[STREAM_END]"]);
    }

    #[tokio::test]
    async fn test_decode_events_stops_after_body_error() {
        let chunks: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"data: partial\n\n".to_vec()),
            Err(TransportError::network("connection reset")),
            Ok(b"data: never\n\n".to_vec()),
        ];

        let items: Vec<_> = decode_events(futures::stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("partial"));
        assert_eq!(items[1].as_ref().unwrap_err().status, 0);
    }
}
