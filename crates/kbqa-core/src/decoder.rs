//! Incremental decoder for streamed answers.
//!
//! The answer stream is newline-delimited JSON: each line is a record of
//! the form `{"text": "..."}` or `{"error": "..."}`. Bytes arrive in chunks
//! with arbitrary boundaries, so the decoder keeps an explicit carry-over
//! buffer and only parses a line once its terminating `\n` has arrived.
//!
//! Lines are split at the byte level. `\n` never occurs inside a multi-byte
//! UTF-8 sequence, so a character split across two chunks is reassembled
//! before the line is decoded. Invalid UTF-8 is replaced, not rejected.
//!
//! Lines that are blank, not JSON, or JSON without a usable field are
//! dropped without ending the stream. An error record is reported as
//! [`StreamEvent::ErrorSignal`] and decoding carries on.

use serde::Deserialize;

/// One decoded event from an answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text to append to the answer buffer.
    TextDelta(String),
    /// An error reported by the backend mid-stream.
    ErrorSignal(String),
    /// The byte stream is exhausted.
    End,
}

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one complete line into an event, if it carries one.
///
/// A non-empty `text` wins over `error` when a record has both. Empty
/// strings count as absent.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let record: StreamRecord = match serde_json::from_str(trimmed) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(error = %e, line = trimmed, "dropping unparseable stream line");
            return None;
        }
    };

    match (record.text, record.error) {
        (Some(text), _) if !text.is_empty() => Some(StreamEvent::TextDelta(text)),
        (_, Some(error)) if !error.is_empty() => Some(StreamEvent::ErrorSignal(error)),
        _ => None,
    }
}

/// Stateful NDJSON decoder fed with raw chunks.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the events for every line it completes.
    ///
    /// Returns nothing once [`finish`](Self::finish) has been called.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| parse_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Signal end of input.
    ///
    /// A trailing line without a final newline is still parsed, then
    /// [`StreamEvent::End`] is emitted exactly once.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let rest = std::mem::take(&mut self.pending);
        let mut events: Vec<StreamEvent> = parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect();
        events.push(StreamEvent::End);
        events
    }

    /// Bytes buffered while waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Decode a complete byte sequence delivered as the given chunks.
pub fn decode_all<'a, I>(chunks: I) -> Vec<StreamEvent>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut decoder = StreamDecoder::new();
    let mut events: Vec<StreamEvent> = chunks
        .into_iter()
        .flat_map(|chunk| decoder.push(chunk))
        .collect();
    events.extend(decoder.finish());
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_split_at_every_offset() {
        let body = b"{\"text\":\"a\"}\n{\"text\":\"b\"}\n";
        for cut in 0..=body.len() {
            let events = decode_all([&body[..cut], &body[cut..]]);
            assert_eq!(text_of(&events), "ab", "cut at {}", cut);
            assert_eq!(events.last(), Some(&StreamEvent::End));
        }
    }

    #[test]
    fn test_multibyte_split_mid_character() {
        let body = "{\"text\":\"h\u{e9}\u{1f600}\"}\n{\"text\":\"\u{4e16}\"}\n".as_bytes();
        for cut in 0..=body.len() {
            let events = decode_all([&body[..cut], &body[cut..]]);
            assert_eq!(text_of(&events), "h\u{e9}\u{1f600}\u{4e16}", "cut at {}", cut);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let body = "{\"text\":\"caf\u{e9} \"}\n{\"text\":\"ol\u{e9}\"}\n".as_bytes();
        let events = decode_all(body.chunks(1));
        assert_eq!(text_of(&events), "caf\u{e9} ol\u{e9}");
    }

    #[test]
    fn test_garbage_line_is_dropped() {
        let events = decode_all([&b"{\"text\":\"a\"}\nnot json\n{\"text\":\"b\"}\n"[..]]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("a".into()),
                StreamEvent::TextDelta("b".into()),
                StreamEvent::End,
            ]
        );
    }

    #[test]
    fn test_error_record_does_not_stop_decoding() {
        let events = decode_all([&b"{\"text\":\"a\"}\n{\"error\":\"boom\"}\n{\"text\":\"b\"}\n"[..]]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("a".into()),
                StreamEvent::ErrorSignal("boom".into()),
                StreamEvent::TextDelta("b".into()),
                StreamEvent::End,
            ]
        );
    }

    #[test]
    fn test_record_spanning_three_chunks() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(b"{\"te").is_empty());
        assert!(decoder.push(b"xt\":\"hel").is_empty());
        assert_eq!(decoder.pending_len(), 12);
        assert_eq!(
            decoder.push(b"lo\"}\n{\"text\""),
            vec![StreamEvent::TextDelta("hello".into())]
        );
        assert_eq!(decoder.pending_len(), 7);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let events = decode_all([&b"{\"text\":\"a\"}\n{\"text\":\"b\"}"[..]]);
        assert_eq!(text_of(&events), "ab");
    }

    #[test]
    fn test_ignores_blank_empty_and_unknown_records() {
        let body = b"\n\r\n{\"text\":\"\"}\n{\"other\":1}\n42\n{\"text\":\"x\"}\r\n";
        let events = decode_all([&body[..]]);
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("x".into()), StreamEvent::End]
        );
    }

    #[test]
    fn test_text_wins_over_error() {
        assert_eq!(
            parse_line(r#"{"text":"t","error":"e"}"#),
            Some(StreamEvent::TextDelta("t".into()))
        );
        assert_eq!(
            parse_line(r#"{"text":"","error":"e"}"#),
            Some(StreamEvent::ErrorSignal("e".into()))
        );
    }

    #[test]
    fn test_finish_is_terminal() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.finish(), vec![StreamEvent::End]);
        assert!(decoder.is_finished());
        assert!(decoder.finish().is_empty());
        assert!(decoder.push(b"{\"text\":\"late\"}\n").is_empty());
    }
}
