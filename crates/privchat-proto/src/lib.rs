//! Wire protocol for privchat.
//!
//! Defines the transport framing and the text-payload shapes exchanged
//! between client and server:
//!
//! - [`Frame`]: length-prefixed command + payload unit
//!   (`[cmd: u8][len: u32 BE][payload]`)
//! - [`codec`]: async frame read/write with explicit reassembly (a frame may
//!   arrive fragmented or coalesced; the reader never assumes one read call
//!   equals one frame)
//! - [`Envelope`]: the `ciphertext || signature` chat payload, modeled as a
//!   typed struct with a dedicated parse/serialize boundary
//! - [`SessionKeyDelivery`]: the `encKey|encIV` handshake payload
//! - [`wire`]: handshake prompt and credential reply strings
//!
//! This crate never interprets ciphertext and never touches key material; it
//! only moves bytes and preserves the wire contracts bit-for-bit.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
mod envelope;
mod errors;
mod frame;
pub mod wire;

pub use envelope::{Envelope, SessionKeyDelivery};
pub use errors::ProtocolError;
pub use frame::{CmdType, Frame};

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;
