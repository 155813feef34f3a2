//! Incremental `text/event-stream` parser for the upstream byte stream.

use serde_json::Value;
use tracing::warn;

/// Feeds on raw bytes, yields one JSON envelope per SSE event. Payload bytes
/// may split anywhere, including inside a UTF-8 sequence or a `data:` line.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        SseParser::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.pending.extend_from_slice(bytes);

        let mut envelopes = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos]);
            if let Some(envelope) = self.take_line(line.trim_end_matches('\r')) {
                envelopes.push(envelope);
            }
        }
        envelopes
    }

    /// Flushes whatever remains once the stream has ended.
    pub fn finish(&mut self) -> Option<Value> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&tail).into_owned();
            if let Some(envelope) = self.take_line(line.trim_end_matches('\r')) {
                return Some(envelope);
            }
        }
        if self.data.is_empty() {
            return None;
        }
        self.parse_accumulated()
    }

    fn take_line(&mut self, line: &str) -> Option<Value> {
        if let Some(payload) = line.strip_prefix("data: ") {
            self.data.push_str(payload);
            return None;
        }
        if line.is_empty() && !self.data.is_empty() {
            return self.parse_accumulated();
        }
        // event names, comments and stray lines carry nothing we use
        None
    }

    fn parse_accumulated(&mut self) -> Option<Value> {
        let payload = std::mem::take(&mut self.data);
        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("skipping unparsable SSE payload: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_event() {
        let mut parser = SseParser::new();
        let envelopes = parser.feed(b"data: {\"a\": 1}\n\n");
        assert_eq!(envelopes, vec![json!({"a": 1})]);
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"key\": ").is_empty());
        let envelopes = parser.feed(b"\"value\"}\n\n");
        assert_eq!(envelopes, vec![json!({"key": "value"})]);
    }

    #[test]
    fn test_chunk_boundary_inside_utf8() {
        let mut parser = SseParser::new();
        let frame = "data: {\"t\": \"héllo\"}\n\n".as_bytes();
        // Split in the middle of the two-byte é sequence
        let split = frame.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(parser.feed(&frame[..split]).is_empty());
        let envelopes = parser.feed(&frame[split..]);
        assert_eq!(envelopes, vec![json!({"t": "héllo"})]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let envelopes = parser.feed(b"data: {\"n\": 1}\n\ndata: {\"n\": 2}\n\n");
        assert_eq!(envelopes, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[test]
    fn test_multi_data_lines_accumulate() {
        let mut parser = SseParser::new();
        let envelopes = parser.feed(b"data: {\"n\":\ndata:  1}\n\n");
        assert_eq!(envelopes, vec![json!({"n": 1})]);
    }

    #[test]
    fn test_unparsable_payload_is_skipped() {
        let mut parser = SseParser::new();
        let envelopes = parser.feed(b"data: not json\n\ndata: {\"ok\": true}\n\n");
        assert_eq!(envelopes, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_crlf_lines() {
        let mut parser = SseParser::new();
        let envelopes = parser.feed(b"data: {\"a\": 1}\r\n\r\n");
        assert_eq!(envelopes, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut parser = SseParser::new();
        let envelopes = parser.feed(b"event: ping\n: comment\ndata: {\"a\": 1}\n\n");
        assert_eq!(envelopes, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_finish_parses_trailing_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"last\": true}\n").is_empty());
        assert_eq!(parser.finish(), Some(json!({"last": true})));
    }

    #[test]
    fn test_finish_handles_unterminated_data_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"tail\": 1}").is_empty());
        assert_eq!(parser.finish(), Some(json!({"tail": 1})));
    }
}
