//! Property-based tests for frame and payload codecs.
//!
//! Verifies round-trip identity for all valid inputs rather than specific
//! examples, plus the envelope/key-delivery text contracts.

use bytes::Bytes;
use privchat_proto::{CmdType, Envelope, Frame, ProtocolError, SessionKeyDelivery};
use proptest::prelude::*;

/// Strategy for generating arbitrary command types.
fn arbitrary_cmd() -> impl Strategy<Value = CmdType> {
    prop_oneof![Just(CmdType::Hello), Just(CmdType::Data), Just(CmdType::Eot)]
}

/// Strategy for generating arbitrary frames with payloads up to 1 KiB.
fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_cmd(), prop::collection::vec(any::<u8>(), 0..1024))
        .prop_map(|(cmd, payload)| Frame::new(cmd, Bytes::from(payload)))
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        prop_assert_eq!(decoded, frame);
    });
}

#[test]
fn prop_decode_never_reads_past_frame() {
    proptest!(|(frame in arbitrary_frame(), trailing in prop::collection::vec(any::<u8>(), 0..64))| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");
        buf.extend_from_slice(&trailing);

        // Trailing bytes (the next frame, under coalescing) must not leak
        // into this frame's payload.
        let decoded = Frame::decode(&buf).expect("decode should succeed");
        prop_assert_eq!(decoded.payload, frame.payload);
    });
}

#[test]
fn prop_truncation_is_detected() {
    proptest!(|(frame in arbitrary_frame(), cut in 1usize..8)| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let cut = cut.min(buf.len());
        let result = Frame::decode(&buf[..buf.len() - cut]);

        // Any truncation is either a short payload or a short header.
        prop_assert!(
            matches!(result, Err(ProtocolError::FrameTruncated { .. })),
            "expected FrameTruncated, got {result:?}"
        );
    });
}

#[test]
fn prop_envelope_text_roundtrip() {
    proptest!(|(
        ciphertext in prop::collection::vec(any::<u8>(), 1..512),
        signature in prop::option::of(prop::collection::vec(any::<u8>(), 1..512)),
    )| {
        let env = Envelope { ciphertext, signature };
        let text = env.serialize();
        prop_assert_eq!(Envelope::parse(&text).expect("parse should succeed"), env);
    });
}

#[test]
fn prop_key_delivery_text_roundtrip() {
    proptest!(|(
        encrypted_key in prop::collection::vec(any::<u8>(), 1..512),
        encrypted_iv in prop::collection::vec(any::<u8>(), 1..512),
    )| {
        let delivery = SessionKeyDelivery { encrypted_key, encrypted_iv };
        let text = delivery.serialize();
        prop_assert_eq!(
            SessionKeyDelivery::parse(&text).expect("parse should succeed"),
            delivery
        );
    });
}
