//! Line-oriented server-sent-events decoding.
//!
//! Only `data:` lines matter for chat completions. Chunks from the network
//! may split a line anywhere, so bytes are buffered until a newline arrives.

use bytes::BytesMut;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data:` line.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete `data:` line in the buffer, skipping blanks, comments
    /// and other fields.
    pub fn next_line(&mut self) -> Option<SseLine> {
        while let Some(end) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(end + 1);
            if let Some(parsed) = parse_line(&line) {
                return Some(parsed);
            }
        }
        None
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseLine> {
    let line = String::from_utf8_lossy(raw);
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed.strip_prefix("data:")?.trim();
    if data == DONE_SENTINEL {
        Some(SseLine::Done)
    } else {
        Some(SseLine::Data(data.to_string()))
    }
}
