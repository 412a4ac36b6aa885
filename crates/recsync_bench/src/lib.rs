//! Benchmark fixtures.

#![warn(missing_docs)]

use recsync_codec::{to_frame, Action, Message, Topic, Value};

/// Builds an object `depth` levels deep with `width` keys per level.
pub fn nested_document(depth: usize, width: usize) -> Value {
    if depth == 0 {
        return Value::from("leaf");
    }
    Value::object((0..width).map(|i| (format!("key_{i}"), nested_document(depth - 1, width))))
}

/// Builds a flat array of `len` small records.
pub fn record_list(len: usize) -> Value {
    Value::array(
        (0..len)
            .map(|i| {
                Value::object([
                    ("id".to_string(), Value::from(i as f64)),
                    ("name".to_string(), Value::from(format!("user-{i}"))),
                    ("active".to_string(), Value::Bool(i % 2 == 0)),
                ])
            })
            .collect(),
    )
}

/// Builds a record update message carrying `data`.
pub fn update_message(name: &str, version: &str, data: &Value) -> Message {
    Message::new(
        Topic::Record,
        Action::Update,
        vec![
            name.to_string(),
            version.to_string(),
            data.to_json_string().unwrap_or_default(),
        ],
    )
}

/// Concatenates `count` encoded update frames into one inbound chunk.
pub fn update_chunk(count: usize, data: &Value) -> Vec<u8> {
    let mut chunk = Vec::new();
    for i in 0..count {
        let message = update_message(&format!("doc/{i}"), &format!("{}-abc-user", i + 1), data);
        if let Ok(frame) = to_frame(&message) {
            chunk.extend_from_slice(&frame);
        }
    }
    chunk
}
