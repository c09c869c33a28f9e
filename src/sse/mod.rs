//! Framing helpers for `text/event-stream` bodies, shared by the relay's
//! upstream reader and the client consumer.

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates raw bytes and yields complete lines as they become available.
/// A line split across two network reads stays buffered until its terminator
/// arrives, so a `data:` record can never be broken apart by chunk
/// boundaries.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns every line completed by it, in
    /// order. Trailing `\r` is stripped so CRLF streams frame identically.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is still buffered once the transport has closed, if anything.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }
}

/// Payload of a `data:` record, if the line is one.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// One event-stream record carrying `payload`.
pub fn data_record(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

/// The in-band record the relay emits when an upstream call fails.
pub fn error_record(message: &str) -> String {
    data_record(&serde_json::json!({ "error": message }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_complete_lines_in_order() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"data: one\n\ndata: two\n");
        assert_eq!(lines, vec!["data: one", "", "data: two"]);
    }

    #[test]
    fn holds_partial_line_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"data: {\"choi").is_empty());
        let lines = framer.push(b"ces\":[]}\n");
        assert_eq!(lines, vec!["data: {\"choices\":[]}"]);
    }

    #[test]
    fn multibyte_utf8_survives_chunk_split() {
        let record = "data: 你好\n".as_bytes();
        let mut framer = LineFramer::new();
        // Split inside the first multi-byte character.
        assert!(framer.push(&record[..8]).is_empty());
        let lines = framer.push(&record[8..]);
        assert_eq!(lines, vec!["data: 你好"]);
    }

    #[test]
    fn strips_carriage_returns() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"data: x\r\n");
        assert_eq!(lines, vec!["data: x"]);
    }

    #[test]
    fn finish_returns_leftover() {
        let mut framer = LineFramer::new();
        framer.push(b"data: complete\n");
        framer.push(b"data: tail");
        assert_eq!(framer.finish(), Some("data: tail".to_string()));
        assert_eq!(LineFramer::new().finish(), None);
    }

    #[test]
    fn data_payload_requires_prefix() {
        assert_eq!(data_payload("data: [DONE]"), Some("[DONE]"));
        assert_eq!(data_payload("event: ping"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn error_record_is_a_json_data_record() {
        let record = error_record("boom");
        assert_eq!(record, "data: {\"error\":\"boom\"}\n\n");
    }
}
