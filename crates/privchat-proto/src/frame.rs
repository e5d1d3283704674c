//! Frame type: the transport-layer unit of the protocol.
//!
//! Layout on the wire:
//! `[cmd: u8] + [payload_len: u32, big endian] + [payload: variable bytes]`
//!
//! A `Frame` is a pure data holder. The framer does not interpret payload
//! contents; chat envelopes, key material and prompts are all opaque bytes at
//! this layer.

use bytes::{BufMut, Bytes};

use crate::errors::ProtocolError;

/// Command discriminant carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdType {
    /// Connection-open marker, sent by a client right after connecting.
    Hello = 1,
    /// Application data (handshake payloads and chat envelopes).
    Data = 2,
    /// End of transmission: graceful disconnect at any handshake stage.
    Eot = 3,
}

impl CmdType {
    /// Wire byte for this command.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. `None` for unknown commands.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Hello),
            2 => Some(Self::Data),
            3 => Some(Self::Eot),
            _ => None,
        }
    }
}

/// Complete protocol frame.
///
/// # Invariants
///
/// - `payload.len()` never exceeds [`Frame::MAX_PAYLOAD_SIZE`] for frames
///   produced by [`Frame::encode`] or accepted by [`Frame::decode`].
/// - `Hello` and `Eot` frames carry an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command type.
    pub cmd: CmdType,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Header size in bytes: command byte plus length prefix.
    pub const HEADER_SIZE: usize = 5;

    /// Maximum payload size (64 KiB).
    ///
    /// Chat messages, base64 key material and credential lines all fit with
    /// a wide margin; anything larger is rejected before allocation.
    pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

    /// Create a frame from a command and raw payload.
    #[must_use]
    pub fn new(cmd: CmdType, payload: impl Into<Bytes>) -> Self {
        Self { cmd, payload: payload.into() }
    }

    /// Connection-open marker frame.
    #[must_use]
    pub fn hello() -> Self {
        Self::new(CmdType::Hello, Bytes::new())
    }

    /// End-of-transmission frame.
    #[must_use]
    pub fn eot() -> Self {
        Self::new(CmdType::Eot, Bytes::new())
    }

    /// Data frame carrying a UTF-8 text payload.
    #[must_use]
    pub fn data(text: &str) -> Self {
        Self::new(CmdType::Data, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Payload interpreted as UTF-8 text.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidUtf8` if the payload is not valid UTF-8.
    pub fn payload_str(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Encode the frame into a buffer.
    ///
    /// # Errors
    ///
    /// `ProtocolError::FrameTooLarge` if the payload exceeds
    /// [`Frame::MAX_PAYLOAD_SIZE`]. This is the enforcement point for the
    /// size cap on the send path.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        if self.payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        dst.put_u8(self.cmd.to_u8());
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode one frame from the start of a buffer.
    ///
    /// Trailing bytes after the frame are ignored; use [`crate::codec`] for
    /// stream reads with explicit reassembly.
    ///
    /// # Errors
    ///
    /// - `UnknownCommand` for an unrecognized command byte
    /// - `FrameTooLarge` if the header claims more than the size cap
    /// - `FrameTruncated` if the buffer ends before the claimed payload
    ///
    /// All validation happens before the payload is copied, so malformed
    /// headers are rejected without allocating.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(&cmd_byte) = bytes.first() else {
            return Err(ProtocolError::FrameTruncated { expected: Self::HEADER_SIZE, actual: 0 });
        };

        let cmd = CmdType::from_u8(cmd_byte).ok_or(ProtocolError::UnknownCommand(cmd_byte))?;

        let Some(len_bytes) = bytes.get(1..Self::HEADER_SIZE) else {
            return Err(ProtocolError::FrameTruncated {
                expected: Self::HEADER_SIZE,
                actual: bytes.len(),
            });
        };

        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(len_bytes);
        let payload_len = u32::from_be_bytes(len_buf) as usize;

        if payload_len > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        let Some(payload) = bytes.get(Self::HEADER_SIZE..Self::HEADER_SIZE + payload_len) else {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_len,
                actual: bytes.len().saturating_sub(Self::HEADER_SIZE),
            });
        };

        Ok(Self { cmd, payload: Bytes::copy_from_slice(payload) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cmd_round_trip() {
        for cmd in [CmdType::Hello, CmdType::Data, CmdType::Eot] {
            assert_eq!(CmdType::from_u8(cmd.to_u8()), Some(cmd));
        }
        assert_eq!(CmdType::from_u8(0), None);
        assert_eq!(CmdType::from_u8(0xff), None);
    }

    #[test]
    fn frame_encode_decode() {
        let frame = Frame::data("hello world");

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        assert_eq!(wire.len(), Frame::HEADER_SIZE + 11);

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.payload_str().unwrap(), "hello world");
    }

    #[test]
    fn control_frames_have_empty_payload() {
        for frame in [Frame::hello(), Frame::eot()] {
            let mut wire = Vec::new();
            frame.encode(&mut wire).unwrap();
            assert_eq!(wire.len(), Frame::HEADER_SIZE);
            assert_eq!(Frame::decode(&wire).unwrap(), frame);
        }
    }

    #[test]
    fn reject_oversized_payload_on_encode() {
        let frame = Frame::new(CmdType::Data, vec![0u8; Frame::MAX_PAYLOAD_SIZE + 1]);
        let mut wire = Vec::new();
        assert!(matches!(frame.encode(&mut wire), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn reject_oversized_claim_on_decode() {
        let mut wire = vec![CmdType::Data.to_u8()];
        wire.extend_from_slice(&(u32::MAX).to_be_bytes());
        assert!(matches!(Frame::decode(&wire), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn reject_unknown_command() {
        let wire = [0x42u8, 0, 0, 0, 0];
        assert!(matches!(Frame::decode(&wire), Err(ProtocolError::UnknownCommand(0x42))));
    }

    #[test]
    fn reject_truncated_frame() {
        let frame = Frame::data("truncate me");
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        let result = Frame::decode(&wire[..wire.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    }

    #[test]
    fn invalid_utf8_payload() {
        let frame = Frame::new(CmdType::Data, vec![0xff, 0xfe]);
        assert!(matches!(frame.payload_str(), Err(ProtocolError::InvalidUtf8)));
    }
}
