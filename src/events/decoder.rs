//! SSE Line Decoder
//!
//! The upstream detector emits one JSON object per `data:` line. Other SSE
//! fields (`id:`, `event:`, `retry:`, comments) are passed through untouched
//! but never decoded.

use bytes::{Bytes, BytesMut};
use serde_json::{Map, Value};

/// A decoded detector event: an arbitrary JSON object, forwarded verbatim
pub type Event = Map<String, Value>;

const DATA_PREFIX: &[u8] = b"data:";

/// Result of decoding a single SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    /// Line carries no `data:` payload (blank separator, comment, other field)
    NoPayload,
    /// Line carried a JSON object
    Event(Event),
    /// Line carried a payload that is not a JSON object
    Malformed(String),
}

/// Decode one raw SSE line (with or without its trailing newline)
pub fn decode_line(line: &[u8]) -> DecodedLine {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return DecodedLine::NoPayload;
    };

    let payload = match std::str::from_utf8(payload) {
        Ok(text) => text.trim(),
        Err(e) => return DecodedLine::Malformed(e.to_string()),
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(event)) => DecodedLine::Event(event),
        Ok(other) => DecodedLine::Malformed(format!("expected JSON object, got {}", kind(&other))),
        Err(e) => DecodedLine::Malformed(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Longest unterminated line [`LineBuffer::new`] will hold
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Reassembles newline-terminated lines from arbitrarily chunked bytes.
///
/// Lines are yielded byte-for-byte, including the terminating `\n`, so they
/// can be relayed to a downstream SSE client unchanged. Bytes after the last
/// newline stay buffered until more data arrives; at end of stream they are
/// discarded by the caller.
///
/// A partial line that grows past the limit is dropped along with the rest
/// of that line, up to and including its `\n`.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    max_line: usize,
    /// Inside an oversized line; drop input until the next `\n`
    discarding: bool,
    dropped_lines: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_line: max_line.max(1),
            discarding: false,
            dropped_lines: 0,
        }
    }

    /// Append a chunk read from the upstream body
    ///
    /// Returns the number of bytes thrown away because they belong to an
    /// oversized line.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let mut chunk = chunk;
        let mut dropped = 0;

        if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    dropped += end + 1;
                    chunk = &chunk[end + 1..];
                    self.discarding = false;
                }
                None => return chunk.len(),
            }
        }

        self.buf.extend_from_slice(chunk);

        let tail_start = self
            .buf
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |end| end + 1);
        let tail = self.buf.len() - tail_start;

        if tail > self.max_line {
            self.buf.truncate(tail_start);
            self.discarding = true;
            self.dropped_lines += 1;
            dropped += tail;
            tracing::warn!(
                limit = self.max_line,
                buffered = tail,
                "Dropping oversized SSE line"
            );
        }

        dropped
    }

    /// Take the next complete line, if one is buffered
    pub fn next_line(&mut self) -> Option<Bytes> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        Some(self.buf.split_to(end + 1).freeze())
    }

    /// Number of bytes belonging to an unterminated line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Lines dropped for exceeding the limit
    pub fn dropped_lines(&self) -> usize {
        self.dropped_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_detection_line() {
        let line = br#"data: {"type":"detection","data":{"name":"Alice","authorized":true,"confidence":0.97}}"#;
        match decode_line(line) {
            DecodedLine::Event(event) => {
                assert_eq!(event["type"], "detection");
                assert_eq!(event["data"]["name"], "Alice");
            }
            other => panic!("Expected Event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_trims_whitespace_and_newline() {
        let line = b"data:   {\"type\":\"status\"}  \r\n";
        assert!(matches!(decode_line(line), DecodedLine::Event(_)));
    }

    #[test]
    fn test_non_data_lines_have_no_payload() {
        assert_eq!(decode_line(b"\n"), DecodedLine::NoPayload);
        assert_eq!(decode_line(b": keep-alive\n"), DecodedLine::NoPayload);
        assert_eq!(decode_line(b"event: detection\n"), DecodedLine::NoPayload);
        assert_eq!(decode_line(b"id: 42\n"), DecodedLine::NoPayload);
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            decode_line(b"data: {not json}\n"),
            DecodedLine::Malformed(_)
        ));
        assert!(matches!(decode_line(b"data:\n"), DecodedLine::Malformed(_)));
    }

    #[test]
    fn test_non_object_json_is_malformed() {
        match decode_line(b"data: [1, 2, 3]\n") {
            DecodedLine::Malformed(reason) => assert!(reason.contains("array")),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_line_buffer_reassembles_split_chunks() {
        let mut lines = LineBuffer::new();
        lines.push(b"data: {\"a\"");
        assert!(lines.next_line().is_none());

        lines.push(b":1}\n\ndata: {\"b\":2}\nda");
        assert_eq!(lines.next_line().unwrap().as_ref(), b"data: {\"a\":1}\n");
        assert_eq!(lines.next_line().unwrap().as_ref(), b"\n");
        assert_eq!(lines.next_line().unwrap().as_ref(), b"data: {\"b\":2}\n");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.pending(), 2);
    }

    #[test]
    fn test_line_buffer_keeps_crlf() {
        let mut lines = LineBuffer::new();
        lines.push(b"data: {}\r\n");
        assert_eq!(lines.next_line().unwrap().as_ref(), b"data: {}\r\n");
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn test_line_buffer_drops_oversized_line() {
        let mut lines = LineBuffer::with_max_line(16);
        lines.push(b"data: {}\ndata: {\"pad\":\"");
        assert_eq!(lines.next_line().unwrap().as_ref(), b"data: {}\n");
        assert!(lines.next_line().is_none());

        // Past the limit: the partial line goes, and so does its remainder
        let dropped = lines.push(b"xxxxxxxxxxxxxxxx");
        assert!(dropped > 16);
        assert_eq!(lines.pending(), 0);
        assert_eq!(lines.push(b"xxxxxxxx"), 8);
        assert_eq!(lines.pending(), 0);

        assert_eq!(lines.push(b"xx\"}\ndata: {\"b\":2}\n"), 5);
        assert_eq!(lines.next_line().unwrap().as_ref(), b"data: {\"b\":2}\n");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.dropped_lines(), 1);
    }

    #[test]
    fn test_line_buffer_memory_is_bounded() {
        let mut lines = LineBuffer::with_max_line(1024);
        for _ in 0..1000 {
            lines.push(&[b'a'; 512]);
            assert!(lines.pending() <= 1024);
        }
        assert_eq!(lines.dropped_lines(), 1);

        lines.push(b"\ndata: {}\n");
        assert_eq!(lines.next_line().unwrap().as_ref(), b"data: {}\n");
    }
}
