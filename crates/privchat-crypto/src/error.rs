//! Crypto error types.

use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Keypair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Public key material could not be parsed (bad base64 or DER).
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Asymmetric encryption failed (input too large for the modulus).
    #[error("asymmetric encryption failed: {0}")]
    Encrypt(String),

    /// Decryption failed: wrong key, corrupted ciphertext or bad padding.
    ///
    /// Callers treat this as an unverifiable message: drop it and log, never
    /// surface an error to the sender.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// Signature does not match the plaintext.
    #[error("signature verification failed")]
    BadSignature,

    /// Key or IV slice has the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },
}
