//! Property tests for frame encoding and decoding.

use proptest::prelude::*;
use recsync_codec::{decode_frames, to_frame, Action, FrameDecoder, Message, Topic, TypedValue};

fn topic() -> impl Strategy<Value = Topic> {
    prop_oneof![
        Just(Topic::Connection),
        Just(Topic::Auth),
        Just(Topic::Event),
        Just(Topic::Record),
        Just(Topic::Rpc),
    ]
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Ack),
        Just(Action::Read),
        Just(Action::Update),
        Just(Action::Subscribe),
        Just(Action::Event),
        Just(Action::SubscriptionHasProvider),
    ]
}

/// Arguments drawn from an alphabet that includes both separators.
fn arg() -> impl Strategy<Value = String> {
    "[a-z0-9\\-{}\":\u{1e}\u{1f}é]{0,48}"
}

proptest! {
    #[test]
    fn frames_survive_a_chunk(
        messages in prop::collection::vec(
            (topic(), action(), prop::collection::vec(arg(), 0..6))
                .prop_map(|(t, a, args)| Message::new(t, a, args)),
            1..8,
        )
    ) {
        let mut chunk = Vec::new();
        for message in &messages {
            chunk.extend_from_slice(&to_frame(message).unwrap());
        }
        let decoded: Vec<Message> = decode_frames(&chunk)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(decoded, messages);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let frames = FrameDecoder::new(&bytes).with_max_frame_size(128).count();
        prop_assert!(frames <= bytes.len());
    }

    #[test]
    fn typed_strings_keep_their_text(text in "\\PC{0,32}") {
        let encoded = TypedValue::String(text.clone()).encode().unwrap();
        prop_assert_eq!(TypedValue::decode(&encoded).unwrap(), TypedValue::String(text));
    }
}
