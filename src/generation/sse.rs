//! Server-sent events decoding for streaming responses.
//!
//! Network chunks do not line up with event boundaries: one chunk may
//! carry several events, or end halfway through a line or a multi-byte
//! character. [`SseDecoder`] buffers raw bytes and only yields complete
//! events, and [`sse_events`] lifts it over a response byte stream.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};

use llm_suite_core::PipelineError;

use crate::http::classify_reqwest_error;

/// Incremental SSE parser. Yields the `data` payload of each event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let decoded = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text: &str = &decoded;
            let text = text.strip_suffix('\r').unwrap_or(text);
            if let Some(event) = self.process_line(text) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let decoded = String::from_utf8_lossy(&rest).into_owned();
            let text = decoded.strip_suffix('\r').unwrap_or(decoded.as_str());
            if let Some(event) = self.process_line(text) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
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
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

struct SseState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Turn a response byte stream into a stream of SSE `data` payloads.
///
/// A transport error ends the stream after being yielded once.
pub fn sse_events<S, B>(body: S) -> impl Stream<Item = Result<String, PipelineError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.push(chunk.as_ref());
                    st.pending.extend(events);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(classify_reqwest_error(&e)), st));
                }
                None => {
                    st.done = true;
                    if let Some(event) = st.decoder.finish() {
                        st.pending.push_back(event);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert!(decoder.push(b"1}\r\n").is_empty());
        let events = decoder.push(b"\r\ndata: second\n\ndata: thi");
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "second".to_string()]);
        assert_eq!(decoder.push(b"rd\n\n"), vec!["third".to_string()]);
    }

    #[test]
    fn multi_line_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\ndata: one\ndata: two\n\n");
        assert_eq!(events, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn multibyte_char_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = "data: h".len() + 1;
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some("[DONE]".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn stream_adapter_yields_in_order() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(b"data: a\n\nda".to_vec()),
            Ok(b"ta: b\n\n".to_vec()),
            Ok(b"data: c".to_vec()),
        ];
        let events: Vec<String> = sse_events(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(events, vec!["a", "b", "c"]);
    }
}
