//! SSE (Server-Sent Events) stream processing utilities
//!
//! Handles splitting a raw SSE byte stream into `data:` payloads, and the
//! encoding of the events this server writes on its own event-stream routes.

use tracing::{debug, info};

/// End-of-stream marker some providers send as a final data line
pub const DONE_MARKER: &str = "[DONE]";

/// Incremental SSE decoder that handles partial lines across chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes after the last newline seen so far
    partial_line: Vec<u8>,
    /// Data payloads decoded so far
    event_count: usize,
    /// Bytes received counter
    bytes_received: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every `data:` payload completed by it
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.bytes_received += bytes.len();
        self.partial_line.extend_from_slice(bytes);

        // Only complete lines are processed; a trailing fragment waits for more bytes
        let Some(last_newline) = self.partial_line.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.partial_line.drain(..=last_newline).collect();

        let payloads: Vec<String> = String::from_utf8_lossy(&complete)
            .lines()
            .filter_map(parse_data_line)
            .collect();

        self.event_count += payloads.len();
        debug!(
            "SSE chunk: {} bytes (total: {} bytes), {} payloads",
            bytes.len(),
            self.bytes_received,
            payloads.len()
        );
        payloads
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Option<String> {
        info!(
            "SSE stream finished: {} events, {} bytes",
            self.event_count, self.bytes_received
        );
        if self.partial_line.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial_line);
        let payload = parse_data_line(String::from_utf8_lossy(&rest).trim_end());
        if payload.is_some() {
            self.event_count += 1;
        }
        payload
    }
}

/// Extract the payload of a `data:` line; comments and other fields yield nothing
fn parse_data_line(line: &str) -> Option<String> {
    // Skip empty lines and SSE comments
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim().is_empty() {
        return None;
    }
    Some(data.to_string())
}

/// Frame a JSON payload as one SSE event
pub fn encode_event(payload: &serde_json::Value) -> String {
    format!("data: {}\n\n", payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert!(decoder.push(b"xt\":\"hi\"}").is_empty());
        let payloads = decoder.push(b"\r\n\r\n");
        assert_eq!(payloads, vec!["{\"text\":\"hi\"}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let line = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(decoder.push(&line[split..]), vec!["héllo"]);
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata:compact\n\n");
        assert_eq!(payloads, vec!["compact"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(DONE_MARKER.to_string()));
    }

    #[test]
    fn test_encode_event() {
        let event = encode_event(&serde_json::json!({ "done": true }));
        assert_eq!(event, "data: {\"done\":true}\n\n");
    }
}
