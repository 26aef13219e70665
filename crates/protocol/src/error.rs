//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding, decoding or framing messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame grew past the configured limit before its terminator arrived
    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured maximum frame length
        limit: usize,
    },

    /// Frame bytes are not UTF-8
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
