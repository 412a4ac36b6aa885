//! Wire test vectors.
//!
//! Each vector pairs a message with the exact bytes it must encode to, so
//! independent client implementations can check themselves against the
//! same frames.

use recsync_codec::{Action, Message, Topic};
use serde::{Deserialize, Serialize};

/// A frame vector that can be shared across implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Topic code.
    pub topic: char,
    /// Action code.
    pub action: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Encoded frame (hex-encoded).
    pub frame_hex: String,
}

impl FrameVector {
    fn new(id: &str, description: &str, message: &Message, frame_hex: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            topic: message.topic.code() as char,
            action: message.action.code().into(),
            args: message.args.clone(),
            frame_hex: frame_hex.into(),
        }
    }

    /// Rebuilds the message this vector describes.
    ///
    /// # Panics
    ///
    /// Panics if the vector names an unknown topic or action.
    pub fn message(&self) -> Message {
        let topic = u8::try_from(self.topic).expect("topic is ASCII");
        Message::new(
            Topic::from_code(topic).expect("known topic"),
            Action::from_code(&self.action).expect("known action"),
            self.args.clone(),
        )
    }
}

/// Frame encoding vectors.
pub fn frame_vectors() -> Vec<FrameVector> {
    vec![
        FrameVector::new(
            "connection_ping",
            "Heartbeat probe without arguments",
            &Message::bare(Topic::Connection, Action::Ping),
            "431f50491e",
        ),
        FrameVector::new(
            "record_subscribe",
            "Subscribe to a record",
            &Message::new(Topic::Record, Action::Subscribe, vec!["doc".into()]),
            "521f531f646f631e",
        ),
        FrameVector::new(
            "record_update",
            "Full-document update with version and JSON data",
            &Message::new(
                Topic::Record,
                Action::Update,
                vec!["name".into(), "1-abc-".into(), r#"{"x":1}"#.into()],
            ),
            "521f551f6e616d651f312d6162632d1f7b2278223a317d1e",
        ),
        FrameVector::new(
            "record_empty_argument",
            "Empty arguments keep their separator",
            &Message::new(Topic::Record, Action::Error, vec!["doc".into(), String::new()]),
            "521f451f646f631f1e",
        ),
        FrameVector::new(
            "headered_separator_argument",
            "An argument holding a separator forces the length header",
            &Message::new(Topic::Event, Action::Event, vec!["a\u{1e}b".into()]),
            "8103451f4556541f611e621e",
        ),
    ]
}

/// Serializes all vectors as JSON.
pub fn all_vectors_json() -> String {
    serde_json::to_string_pretty(&frame_vectors()).expect("Failed to serialize vectors")
}
