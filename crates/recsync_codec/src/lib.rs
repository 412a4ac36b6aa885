//! # recsync codec
//!
//! Wire frame codec and value model for the recsync protocol.
//!
//! This crate provides:
//! - [`Value`], an immutable JSON tree whose containers are shared by `Arc`
//! - [`Message`] framing with [`FrameEncoder`] and [`FrameDecoder`]
//! - [`TypedValue`], the one-byte-tag scalar encoding for embedded payloads
//! - [`Payload`], the text/binary shapes a transport may deliver
//!
//! ## Frame layout
//!
//! ```text
//! plain:     topic 0x1F action (0x1F arg)* 0x1E
//! headered:  (0x80|n) <n bytes of LEB128 arg lengths> topic 0x1F action 0x1F args.. 0x1E
//! ```
//!
//! The headered form is used only when an argument contains one of the
//! separator bytes.
//!
//! ## Usage
//!
//! ```
//! use recsync_codec::{decode_frames, Action, FrameEncoder, Message, Topic};
//!
//! let mut encoder = FrameEncoder::new();
//! let message = Message::new(Topic::Record, Action::Subscribe, vec!["user/1".into()]);
//! let frame = encoder.encode(&message).unwrap();
//!
//! let decoded = decode_frames(&frame);
//! assert_eq!(decoded[0].as_ref().unwrap(), &message);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod frame;
mod payload;
mod typed;
mod value;
mod varint;

pub use decoder::{decode_frames, FrameDecoder};
pub use encoder::{to_frame, FrameEncoder, DEFAULT_CHUNK_CAPACITY, DEFAULT_MAX_PACKET_SIZE};
pub use error::{CodecError, CodecResult};
pub use frame::{
    Action, Message, Topic, FIELD_SEPARATOR, HEADER_FLAG, MAX_HEADER_LEN, MESSAGE_SEPARATOR,
};
pub use payload::Payload;
pub use typed::TypedValue;
pub use value::{Entries, Value};

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: &Message) -> Message {
        let frame = to_frame(message).unwrap();
        let mut decoded = decode_frames(&frame);
        assert_eq!(decoded.len(), 1);
        decoded.remove(0).unwrap()
    }

    #[test]
    fn roundtrip_record_update() {
        let message = Message::new(
            Topic::Record,
            Action::Update,
            vec!["name".into(), "1-abc-".into(), r#"{"x":1}"#.into()],
        );
        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn roundtrip_typed_argument() {
        let typed = TypedValue::from(Value::from(serde_json::json!([1, "two", null])));
        let message = Message::new(Topic::Event, Action::Event, vec!["topic".into(), typed.encode().unwrap()]);
        let decoded = roundtrip(&message);
        assert_eq!(TypedValue::decode(&decoded.args[1]).unwrap(), typed);
    }

    #[test]
    fn text_and_binary_payloads_decode_alike() {
        let text = Payload::from("R\u{1f}S\u{1f}doc\u{1e}");
        let binary = Payload::from(b"R\x1fS\x1fdoc\x1e".to_vec());
        assert_eq!(
            decode_frames(text.as_bytes()),
            decode_frames(binary.as_bytes())
        );
    }
}
