//! Line framing for `text/event-stream` bodies.
//!
//! Bytes are buffered until a full line is available, so a multi-byte UTF-8
//! character split across two network chunks is decoded once both halves
//! have arrived. Only `data: ` lines matter here; everything else (blank
//! separators, `event:` names, `:` comments) is dropped.

/// Payload that terminates a stream.
pub const DONE_MARKER: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Text after the `data: ` prefix.
    Data(String),
    /// The `[DONE]` terminator. Nothing after it is yielded.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` terminator has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk of the response body and return every complete line
    /// it finished.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        if self.done {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(line) = self.decode_line(&raw[..raw.len() - 1]) {
                lines.push(line);
                if self.done {
                    self.buf.clear();
                    break;
                }
            }
        }
        lines
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<SseLine> {
        if self.done || self.buf.is_empty() {
            self.buf.clear();
            return Vec::new();
        }
        let raw = std::mem::take(&mut self.buf);
        self.decode_line(&raw).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseLine> {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        let payload = line.strip_prefix(DATA_PREFIX)?;
        if payload == DONE_MARKER {
            self.done = true;
            return Some(SseLine::Done);
        }
        Some(SseLine::Data(payload.to_string()))
    }
}
