//! Protocol error types.

use thiserror::Error;

/// Errors produced while framing or parsing wire payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame payload exceeds [`crate::Frame::MAX_PAYLOAD_SIZE`].
    ///
    /// Fatal for the connection: the caller must close it. A peer claiming an
    /// oversized payload is either broken or hostile; we never allocate for
    /// it.
    #[error("frame payload too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Claimed payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// Buffer ends before the payload the header claims.
    #[error("truncated frame: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header claims.
        expected: usize,
        /// Payload bytes actually present.
        actual: usize,
    },

    /// Command byte is not a known [`crate::CmdType`].
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    /// The peer closed the stream (EOF at a frame boundary or mid-frame).
    #[error("connection closed")]
    ConnectionClosed,

    /// A text payload was expected but the bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// An envelope or key-delivery payload does not match its wire shape
    /// (wrong field count, undecodable base64).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Underlying stream I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
