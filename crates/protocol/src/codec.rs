//! Line framing for the wire protocol
//!
//! Records are UTF-8 JSON terminated by `\n` (a trailing `\r` is stripped) or
//! by a NUL byte. [`FrameBuffer`] holds the per-connection partial record.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::Message;

/// Default maximum record length (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Encode a message as a newline-terminated JSON record
pub fn encode(message: &Message) -> ProtocolResult<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one record (terminator optional)
pub fn decode(frame: &str) -> ProtocolResult<Message> {
    let trimmed = frame.trim_end_matches(['\n', '\r', '\0']);
    Ok(serde_json::from_str(trimmed)?)
}

/// Accumulates raw bytes for one connection and yields complete records
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_len: usize,
    /// Set while skipping the rest of an oversized record
    discarding: bool,
}

impl FrameBuffer {
    /// Buffer with the default record limit
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Buffer with a custom record limit
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Feed bytes, returning every record completed by them in arrival order
    ///
    /// Empty records (back-to-back terminators) are skipped. An oversized
    /// record yields one [`ProtocolError::FrameTooLarge`] and is dropped up to
    /// its terminator.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ProtocolResult<String>> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == b'\n' || byte == 0 {
                if self.discarding {
                    self.discarding = false;
                    self.buf.clear();
                    continue;
                }
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                if self.buf.is_empty() {
                    continue;
                }
                let raw = std::mem::take(&mut self.buf);
                frames.push(String::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8));
                continue;
            }

            if self.discarding {
                continue;
            }
            // A `\r` right at the limit may still be the first half of CRLF
            let crlf_slack = byte == b'\r' && self.buf.len() == self.max_len;
            if self.buf.len() >= self.max_len && !crlf_slack {
                self.buf.clear();
                self.discarding = true;
                frames.push(Err(ProtocolError::FrameTooLarge {
                    limit: self.max_len,
                }));
                continue;
            }
            self.buf.push(byte);
        }

        frames
    }

    /// Bytes held for the current partial record
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial record
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
