//! Property-based test generators using proptest.
//!
//! Provides strategies for JSON trees, path strings, version tokens and
//! wire messages that stay inside the protocol's invariants (finite
//! numbers, well-formed paths, parseable versions).

use proptest::prelude::*;
use recsync_codec::{Action, Message, Topic, Value};

/// Strategy for object keys. Plain identifiers keep generated paths simple.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for JSON scalars with finite numbers.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000).prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::from),
    ]
}

/// Strategy for JSON trees up to a few levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::array),
            prop::collection::vec((key_strategy(), inner), 0..6).prop_map(Value::object),
        ]
    })
}

/// Strategy for object roots, the shape records hold.
pub fn object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec((key_strategy(), value_strategy()), 0..6).prop_map(Value::object)
}

/// Strategy for path strings that start with a property segment.
///
/// Mixes dotted properties and bracketed indices, e.g. `a.b[2].c`.
pub fn path_strategy() -> impl Strategy<Value = String> {
    let segment = prop_oneof![
        3 => key_strategy().prop_map(|k| format!(".{k}")),
        1 => (0usize..8).prop_map(|i| format!("[{i}]")),
    ];
    (key_strategy(), prop::collection::vec(segment, 0..4))
        .prop_map(|(head, rest)| format!("{head}{}", rest.concat()))
}

/// Strategy for valid version tokens, stale ones included.
pub fn version_strategy() -> impl Strategy<Value = String> {
    let sequence = prop_oneof![
        9 => (0u64..10_000).prop_map(|n| n.to_string()),
        1 => Just("I".to_string()),
    ];
    (
        sequence,
        "[0-9a-f]{4,12}",
        prop::string::string_regex("[a-z]{0,6}").expect("Invalid regex"),
    )
        .prop_map(|(seq, uid, user)| format!("{seq}-{uid}-{user}"))
}

/// Strategy for frame arguments, occasionally containing separator bytes.
pub fn arg_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        8 => "[ -~]{0,24}",
        1 => "[a-z\u{1e}\u{1f}]{1,8}",
        1 => Just(String::new()),
    ]
}

/// Strategy for record-topic messages with arbitrary arguments.
pub fn message_strategy() -> impl Strategy<Value = Message> {
    let action = prop_oneof![
        Just(Action::Read),
        Just(Action::Update),
        Just(Action::Subscribe),
        Just(Action::Unsubscribe),
        Just(Action::SubscriptionHasProvider),
        Just(Action::Error),
    ];
    (action, prop::collection::vec(arg_strategy(), 0..4))
        .prop_map(|(action, args)| Message::new(Topic::Record, action, args))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
