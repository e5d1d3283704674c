//! Client error types.

use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed frame or payload from the server.
    #[error("protocol error: {0}")]
    Protocol(#[from] privchat_proto::ProtocolError),

    /// Cryptographic operation failed.
    #[error("crypto failure: {0}")]
    Crypto(#[from] privchat_crypto::CryptoError),

    /// The server sent a reply the handshake did not expect.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Login or registration was rejected by the server.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Operation requires a completed handshake.
    #[error("session not established")]
    NotReady,

    /// The server closed the connection.
    #[error("connection closed by server")]
    Disconnected,

    /// Transport-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
