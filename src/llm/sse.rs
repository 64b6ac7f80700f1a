//! SSE byte-stream decoding for upstream providers.
//!
//! Transports may cut chunks anywhere, including mid-codepoint. The buffer
//! therefore splits on raw `\n` bytes (0x0A never occurs inside a UTF-8
//! continuation sequence) and only converts complete lines to text; a
//! partial codepoint simply stays buffered until its line completes. A
//! transport that delivers the whole response as one buffered blob decodes
//! identically to a true chunked stream.

use std::collections::VecDeque;

use futures::StreamExt;
use futures::stream::BoxStream;

use super::types::StreamEvent;

/// Accumulates raw bytes and yields complete lines (without `\n`/`\r\n`).
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, get every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Extract the payload of a `data:` line; other SSE fields and comments
/// return None.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

pub type ByteStream = BoxStream<'static, reqwest::Result<bytes::Bytes>>;
pub type EventStream = BoxStream<'static, StreamEvent>;

struct DecodeState<P> {
    body: ByteStream,
    buf: SseLineBuffer,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    parse: P,
}

/// Turn a provider response body into a stream of [`StreamEvent`]s using a
/// per-provider `data:` payload parser. Dropping the returned stream drops
/// the response body, which aborts the upstream connection.
pub fn decode_events<P>(body: ByteStream, parse: P) -> EventStream
where
    P: Fn(&str) -> Vec<StreamEvent> + Send + 'static,
{
    let state = DecodeState {
        body,
        buf: SseLineBuffer::new(),
        pending: VecDeque::new(),
        finished: false,
        parse,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_terminal() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((event, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for line in state.buf.push(&chunk) {
                        if let Some(payload) = data_payload(&line) {
                            state.pending.extend((state.parse)(payload));
                        }
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(StreamEvent::Error(e.to_string()));
                }
                // Body closed without an explicit end marker: what streamed
                // is deliverable, so finish normally rather than refund.
                None => {
                    state.pending.push_back(StreamEvent::Done);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_across_chunks() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(b"data: {\"a\":").is_empty());
        let lines = buf.push(b"1}\n\ndata: x\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: x"]);
    }

    #[test]
    fn handles_crlf() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.push(b"data: hi\r\n\r\n");
        assert_eq!(lines, vec!["data: hi", ""]);
    }

    #[test]
    fn partial_codepoint_stays_buffered() {
        // "火" = E7 81 AB; split after the first byte.
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(b"data: \xE7").is_empty());
        let lines = buf.push(b"\x81\xAB\n");
        assert_eq!(lines, vec!["data: 火"]);
    }

    #[test]
    fn whole_blob_decodes_like_chunked() {
        let mut buf = SseLineBuffer::new();
        let blob = b"data: a\n\ndata: b\n\ndata: [DONE]\n\n";
        let lines = buf.push(blob);
        let payloads: Vec<_> = lines.iter().filter_map(|l| data_payload(l)).collect();
        assert_eq!(payloads, vec!["a", "b", "[DONE]"]);
    }

    #[test]
    fn data_payload_ignores_other_fields() {
        assert_eq!(data_payload("data: x"), Some("x"));
        assert_eq!(data_payload("data:x"), Some("x"));
        assert_eq!(data_payload("event: ping"), None);
        assert_eq!(data_payload(": comment"), None);
        assert_eq!(data_payload(""), None);
    }

    #[tokio::test]
    async fn decode_stops_after_terminal_event() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"data: one\n\n")),
            Ok(bytes::Bytes::from_static(b"data: end\n\ndata: after\n\n")),
        ];
        let body = futures::stream::iter(chunks).boxed();
        let events: Vec<_> = decode_events(body, |payload| match payload {
            "end" => vec![StreamEvent::Done],
            other => vec![StreamEvent::Delta(other.to_string())],
        })
        .collect()
        .await;

        assert_eq!(
            events,
            vec![StreamEvent::Delta("one".to_string()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn closed_body_without_marker_finishes_normally() {
        let body = futures::stream::iter(vec![Ok(bytes::Bytes::from_static(b"data: x\n\n"))])
            .boxed();
        let events: Vec<_> =
            decode_events(body, |p| vec![StreamEvent::Delta(p.to_string())])
                .collect()
                .await;
        assert_eq!(
            events,
            vec![StreamEvent::Delta("x".to_string()), StreamEvent::Done]
        );
    }
}
