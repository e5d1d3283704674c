//! Privchat cryptographic primitives.
//!
//! Building blocks for the two independent key hierarchies of the protocol:
//!
//! ```text
//! Exchange keypair (RSA-2048)          Signing keypair (RSA-2048)
//!        │                                     │
//!        ▼                                     ▼
//! wraps/unwraps the session key        signs/verifies chat plaintext
//!        │                                  (SHA-256, PKCS#1 v1.5)
//!        ▼
//! Session key (AES-256 + IV, per connection)
//!        │
//!        ▼
//! AES-256-CBC/PKCS#7 → chat ciphertext
//! ```
//!
//! The exchange keypair exists only to move the session key during the
//! handshake; it never encrypts chat content. The signing keypair is
//! independent of it, and signatures are computed over the *plaintext* so a
//! relay can forward them verbatim after re-encrypting for another recipient.
//!
//! # Security
//!
//! - Session keys are generated server-side from a caller-provided CSPRNG,
//!   live for exactly one connection, and are zeroized on drop.
//! - Decryption and verification failures are indistinguishable to the peer:
//!   callers drop the message and log, they never NACK.
//! - Public keys travel as base64(SPKI DER) strings; any standard encoding
//!   satisfies the wire contract and SPKI is the ecosystem default.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod exchange;
mod session_key;
mod signing;
mod symmetric;

pub use error::CryptoError;
pub use exchange::{ExchangeKeyPair, ExchangePublicKey};
pub use session_key::{SESSION_IV_SIZE, SESSION_KEY_SIZE, SessionKey};
pub use signing::{SigningKeyPair, SigningPublicKey};
pub use symmetric::{decrypt, encrypt};

/// RSA modulus size for exchange and signing keypairs.
pub const RSA_BITS: usize = 2048;
