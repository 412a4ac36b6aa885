//! Frame vocabulary: topics, actions and the decoded message shape.

use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Separator between the fields of one frame.
pub const FIELD_SEPARATOR: u8 = 0x1f;

/// Terminator of one frame. A chunk may carry several frames.
pub const MESSAGE_SEPARATOR: u8 = 0x1e;

/// Flag bit marking a length-prefixed frame header.
pub const HEADER_FLAG: u8 = 0x80;

/// Largest header the one-byte size prefix can describe.
pub const MAX_HEADER_LEN: usize = 0x7f;

/// Message topic, encoded as a single ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Connection-layer control (handshake, heartbeat, redirect).
    Connection,
    /// Authentication.
    Auth,
    /// Fire-and-forget events.
    Event,
    /// Records.
    Record,
    /// Remote procedure calls.
    Rpc,
    /// Server-reported errors not tied to another topic.
    Error,
}

impl Topic {
    /// Returns the wire byte for this topic.
    pub fn code(self) -> u8 {
        match self {
            Topic::Connection => b'C',
            Topic::Auth => b'A',
            Topic::Event => b'E',
            Topic::Record => b'R',
            Topic::Rpc => b'P',
            Topic::Error => b'X',
        }
    }

    /// Parses a wire byte.
    pub fn from_code(code: u8) -> CodecResult<Self> {
        match code {
            b'C' => Ok(Topic::Connection),
            b'A' => Ok(Topic::Auth),
            b'E' => Ok(Topic::Event),
            b'R' => Ok(Topic::Record),
            b'P' => Ok(Topic::Rpc),
            b'X' => Ok(Topic::Error),
            other => Err(CodecError::UnknownTopic(other)),
        }
    }
}

macro_rules! actions {
    ($($(#[$doc:meta])* $variant:ident => $code:literal,)*) => {
        /// Message action. Codes are shared across topics.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Action {
            $($(#[$doc])* $variant,)*
        }

        impl Action {
            /// Returns the wire code for this action.
            pub fn code(self) -> &'static str {
                match self {
                    $(Action::$variant => $code,)*
                }
            }

            /// Parses a wire code.
            pub fn from_code(code: &str) -> CodecResult<Self> {
                match code {
                    $($code => Ok(Action::$variant),)*
                    other => Err(CodecError::UnknownAction(other.to_string())),
                }
            }
        }
    };
}

actions! {
    /// Positive acknowledgement.
    Ack => "A",
    /// Error report.
    Error => "E",
    /// Heartbeat probe.
    Ping => "PI",
    /// Heartbeat reply.
    Pong => "PO",
    /// Server asks which URL the client dialled.
    Challenge => "CH",
    /// Reply to a challenge.
    ChallengeResponse => "CHR",
    /// Connection refused.
    Rejection => "REJ",
    /// Connect elsewhere.
    Redirect => "RED",
    /// Request (auth or RPC).
    Request => "REQ",
    /// RPC response.
    Response => "RES",
    /// Record snapshot.
    Read => "R",
    /// Record update.
    Update => "U",
    /// Start receiving a record.
    Subscribe => "S",
    /// Stop receiving a record.
    Unsubscribe => "US",
    /// Sync barrier.
    Sync => "SY",
    /// A provider started or stopped supplying a record.
    SubscriptionHasProvider => "SH",
    /// Register as provider for a pattern.
    Listen => "L",
    /// Unregister a pattern.
    Unlisten => "UL",
    /// Provider accepts a subscription.
    ListenAccept => "LA",
    /// Provider declines a subscription.
    ListenReject => "LR",
    /// A subscription matching a listened pattern appeared.
    SubscriptionForPatternFound => "SP",
    /// A subscription matching a listened pattern went away.
    SubscriptionForPatternRemoved => "SR",
    /// Event emission.
    Event => "EVT",
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message topic.
    pub topic: Topic,
    /// Message action.
    pub action: Action,
    /// Positional arguments.
    pub args: Vec<String>,
}

impl Message {
    /// Creates a message.
    pub fn new(topic: Topic, action: Action, args: Vec<String>) -> Self {
        Self {
            topic,
            action,
            args,
        }
    }

    /// Creates a message without arguments.
    pub fn bare(topic: Topic, action: Action) -> Self {
        Self::new(topic, action, Vec::new())
    }

    /// Returns the argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Returns the argument at `index` or a malformed-frame error naming it.
    pub fn require_arg(&self, index: usize, name: &str) -> CodecResult<&str> {
        self.arg(index).ok_or_else(|| {
            CodecError::malformed(format!(
                "{}|{} is missing argument {} ({})",
                self.topic.code() as char,
                self.action.code(),
                index,
                name
            ))
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.topic.code() as char, self.action.code())?;
        for arg in &self.args {
            write!(f, "|{arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_codes_roundtrip() {
        for topic in [
            Topic::Connection,
            Topic::Auth,
            Topic::Event,
            Topic::Record,
            Topic::Rpc,
            Topic::Error,
        ] {
            assert_eq!(Topic::from_code(topic.code()).unwrap(), topic);
            assert!(topic.code() < HEADER_FLAG);
        }
        assert_eq!(Topic::from_code(b'Z'), Err(CodecError::UnknownTopic(b'Z')));
    }

    #[test]
    fn action_codes() {
        assert_eq!(Action::Update.code(), "U");
        assert_eq!(Action::from_code("SH").unwrap(), Action::SubscriptionHasProvider);
        assert!(matches!(
            Action::from_code("??"),
            Err(CodecError::UnknownAction(_))
        ));
    }

    #[test]
    fn missing_argument_is_named() {
        let message = Message::bare(Topic::Record, Action::Update);
        let err = message.require_arg(1, "version").unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn display_is_pipe_separated() {
        let message = Message::new(Topic::Record, Action::Subscribe, vec!["user/1".into()]);
        assert_eq!(message.to_string(), "R|S|user/1");
    }
}
