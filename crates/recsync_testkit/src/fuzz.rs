//! Fuzz harnesses for the wire codec.
//!
//! Each target accepts arbitrary bytes and must never panic. They can be
//! driven by cargo-fuzz or by the randomized loops in the tests below.

use recsync_codec::{decode_frames, to_frame, FrameDecoder, TypedValue, Value};

/// Fuzz target for frame decoding.
///
/// Tests that arbitrary byte sequences either decode to messages or yield
/// per-frame errors, and that decoding always terminates.
pub fn fuzz_frame_decode(data: &[u8]) {
    let frames = decode_frames(data);
    // Every frame consumes at least one byte.
    assert!(frames.len() <= data.len());
    let _ = FrameDecoder::new(data).with_max_frame_size(64).count();
}

/// Fuzz target for frame roundtrip.
///
/// Every message that decodes must re-encode to a frame that decodes back
/// to the same message.
pub fn fuzz_frame_roundtrip(data: &[u8]) {
    for message in decode_frames(data).into_iter().flatten() {
        let frame = to_frame(&message).expect("decoded message must re-encode");
        let again = decode_frames(&frame);
        assert_eq!(again.len(), 1, "Roundtrip produced several frames");
        assert_eq!(again[0].as_ref().ok(), Some(&message), "Roundtrip mismatch");
    }
}

/// Fuzz target for typed value decoding.
pub fn fuzz_typed_decode(data: &[u8]) {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(typed) = TypedValue::decode(text) {
        let encoded = typed.encode().expect("decoded typed value must re-encode");
        assert_eq!(TypedValue::decode(&encoded).ok(), Some(typed));
    }
}

/// Fuzz target for JSON value parsing.
pub fn fuzz_value_json(data: &[u8]) {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(value) = Value::from_json_str(text) {
        let encoded = value.to_json_string().expect("parsed JSON must re-encode");
        assert_eq!(Value::from_json_str(&encoded).ok(), Some(value));
    }
}
