//! Server error types.

use thiserror::Error;

/// Errors from server operations.
///
/// Propagation policy: failures local to one connection never reach other
/// connections' workers. Most per-connection failures become `CloseConnection`
/// actions rather than errors; the variants here cover genuinely exceptional
/// states and the fatal handshake outcomes.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed or oversized frame.
    ///
    /// Fatal for the connection: close it, no retry.
    #[error("framing error: {0}")]
    Framing(#[from] privchat_proto::ProtocolError),

    /// Out-of-order or malformed handshake payload.
    ///
    /// Fatal for the connection: close it, no retry.
    #[error("handshake violation: {0}")]
    HandshakeViolation(String),

    /// Username already registered by a live connection.
    ///
    /// Fatal for the losing connection; the client must retry with a
    /// different name.
    #[error("duplicate username: {0}")]
    DuplicateUsername(String),

    /// Cryptographic operation failed during the handshake.
    ///
    /// Decrypt/verify failures on chat traffic are not errors; they drop the
    /// message and keep the connection open.
    #[error("crypto failure: {0}")]
    Crypto(#[from] privchat_crypto::CryptoError),

    /// Event referenced a connection the driver does not know.
    ///
    /// Indicates a runtime bookkeeping bug, not a peer failure.
    #[error("unknown connection: {0}")]
    UnknownConnection(u64),

    /// Invalid server configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
