//! Typed views over wire messages.
//!
//! Each topic the client engine speaks gets an enum with a `to_message`
//! builder and a `TryFrom<&Message>` parser. Parsing checks argument
//! counts and decodes embedded JSON and typed values; it never panics on
//! server input.

use crate::error::{ProtocolError, ProtocolResult};
use recsync_codec::{Action, Message, Topic, TypedValue, Value};

/// Error reasons with special meaning to the connection.
pub mod reason {
    /// The authority stopped accepting credentials for this connection.
    pub const TOO_MANY_AUTH_ATTEMPTS: &str = "TOO_MANY_AUTH_ATTEMPTS";
    /// The client did not authenticate in time.
    pub const CONNECTION_AUTHENTICATION_TIMEOUT: &str = "CONNECTION_AUTHENTICATION_TIMEOUT";
    /// Credentials were rejected.
    pub const INVALID_AUTH_DATA: &str = "INVALID_AUTH_DATA";
}

/// Connection-topic messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    /// Heartbeat probe.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Handshake accepted.
    Ack,
    /// Server asks for the dialled URL.
    Challenge,
    /// Reply to a challenge.
    ChallengeResponse {
        /// URL the client connected to.
        url: String,
    },
    /// Connection permanently refused.
    Rejection,
    /// Reconnect to another URL.
    Redirect {
        /// Target URL.
        url: String,
    },
    /// Connection-level error.
    Error {
        /// Error reason.
        reason: String,
    },
}

impl ConnectionMessage {
    /// Builds the wire message.
    pub fn to_message(&self) -> Message {
        let (action, args) = match self {
            ConnectionMessage::Ping => (Action::Ping, vec![]),
            ConnectionMessage::Pong => (Action::Pong, vec![]),
            ConnectionMessage::Ack => (Action::Ack, vec![]),
            ConnectionMessage::Challenge => (Action::Challenge, vec![]),
            ConnectionMessage::ChallengeResponse { url } => {
                (Action::ChallengeResponse, vec![url.clone()])
            }
            ConnectionMessage::Rejection => (Action::Rejection, vec![]),
            ConnectionMessage::Redirect { url } => (Action::Redirect, vec![url.clone()]),
            ConnectionMessage::Error { reason } => (Action::Error, vec![reason.clone()]),
        };
        Message::new(Topic::Connection, action, args)
    }
}

impl TryFrom<&Message> for ConnectionMessage {
    type Error = ProtocolError;

    fn try_from(message: &Message) -> ProtocolResult<Self> {
        expect_topic(message, Topic::Connection)?;
        Ok(match message.action {
            Action::Ping => ConnectionMessage::Ping,
            Action::Pong => ConnectionMessage::Pong,
            Action::Ack => ConnectionMessage::Ack,
            Action::Challenge => ConnectionMessage::Challenge,
            Action::ChallengeResponse => ConnectionMessage::ChallengeResponse {
                url: message.require_arg(0, "url")?.to_string(),
            },
            Action::Rejection => ConnectionMessage::Rejection,
            Action::Redirect => ConnectionMessage::Redirect {
                url: message.require_arg(0, "url")?.to_string(),
            },
            Action::Error => ConnectionMessage::Error {
                reason: message.arg(0).unwrap_or_default().to_string(),
            },
            _ => return Err(unexpected_action(message)),
        })
    }
}

/// Auth-topic messages.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMessage {
    /// Credentials sent by the client.
    Request {
        /// Opaque credential object.
        params: Value,
    },
    /// Authentication accepted.
    Ack {
        /// Identity data returned by the authority, if any.
        identity: Option<Value>,
    },
    /// Authentication refused.
    Error {
        /// Error reason.
        reason: String,
        /// Extra detail returned by the authority, if any.
        detail: Option<Value>,
    },
}

impl AuthMessage {
    /// Builds the wire message.
    ///
    /// # Errors
    ///
    /// Fails if an embedded value holds a non-finite number.
    pub fn to_message(&self) -> ProtocolResult<Message> {
        let (action, args) = match self {
            AuthMessage::Request { params } => (Action::Request, vec![params.to_json_string()?]),
            AuthMessage::Ack { identity: None } => (Action::Ack, vec![]),
            AuthMessage::Ack {
                identity: Some(identity),
            } => (
                Action::Ack,
                vec![TypedValue::from(identity.clone()).encode()?],
            ),
            AuthMessage::Error { reason, detail } => {
                let mut args = vec![reason.clone()];
                if let Some(detail) = detail {
                    args.push(TypedValue::from(detail.clone()).encode()?);
                }
                (Action::Error, args)
            }
        };
        Ok(Message::new(Topic::Auth, action, args))
    }
}

impl TryFrom<&Message> for AuthMessage {
    type Error = ProtocolError;

    fn try_from(message: &Message) -> ProtocolResult<Self> {
        expect_topic(message, Topic::Auth)?;
        Ok(match message.action {
            Action::Request => AuthMessage::Request {
                params: Value::from_json_str(message.require_arg(0, "params")?)?,
            },
            Action::Ack => AuthMessage::Ack {
                identity: optional_typed(message.arg(0))?,
            },
            Action::Error => AuthMessage::Error {
                reason: message.require_arg(0, "reason")?.to_string(),
                detail: optional_typed(message.arg(1))?,
            },
            _ => return Err(unexpected_action(message)),
        })
    }
}

/// Record-topic messages.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordMessage {
    /// Start receiving a record, optionally from a known version.
    Subscribe {
        /// Record name.
        name: String,
        /// Version the client already holds.
        version: Option<String>,
    },
    /// Stop receiving a record.
    Unsubscribe {
        /// Record name.
        name: String,
    },
    /// Request a snapshot.
    Read {
        /// Record name.
        name: String,
    },
    /// Authoritative snapshot (a READ carrying data).
    Snapshot {
        /// Record name.
        name: String,
        /// Snapshot version.
        version: String,
        /// Snapshot data.
        data: Value,
    },
    /// Full-document update.
    Update {
        /// Record name.
        name: String,
        /// Version of `data`.
        version: String,
        /// New data.
        data: Value,
    },
    /// A provider started or stopped supplying the record.
    HasProvider {
        /// Record name.
        name: String,
        /// Whether a provider is active.
        has_provider: bool,
    },
    /// Record-scoped error.
    Error {
        /// Record name.
        name: String,
        /// Error reason.
        reason: String,
    },
    /// Sync barrier.
    Sync {
        /// Record name.
        name: String,
    },
    /// Listener-subsystem action the record engine does not handle.
    Listen {
        /// Listen-family action.
        action: Action,
        /// Raw arguments.
        args: Vec<String>,
    },
}

impl RecordMessage {
    /// The record name this message addresses, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            RecordMessage::Subscribe { name, .. }
            | RecordMessage::Unsubscribe { name }
            | RecordMessage::Read { name }
            | RecordMessage::Snapshot { name, .. }
            | RecordMessage::Update { name, .. }
            | RecordMessage::HasProvider { name, .. }
            | RecordMessage::Error { name, .. }
            | RecordMessage::Sync { name } => Some(name),
            RecordMessage::Listen { .. } => None,
        }
    }

    /// Builds the wire message.
    ///
    /// # Errors
    ///
    /// Fails if record data holds a non-finite number.
    pub fn to_message(&self) -> ProtocolResult<Message> {
        let (action, args) = match self {
            RecordMessage::Subscribe { name, version } => {
                let mut args = vec![name.clone()];
                args.extend(version.iter().cloned());
                (Action::Subscribe, args)
            }
            RecordMessage::Unsubscribe { name } => (Action::Unsubscribe, vec![name.clone()]),
            RecordMessage::Read { name } => (Action::Read, vec![name.clone()]),
            RecordMessage::Snapshot {
                name,
                version,
                data,
            } => (
                Action::Read,
                vec![name.clone(), version.clone(), data.to_json_string()?],
            ),
            RecordMessage::Update {
                name,
                version,
                data,
            } => (
                Action::Update,
                vec![name.clone(), version.clone(), data.to_json_string()?],
            ),
            RecordMessage::HasProvider { name, has_provider } => (
                Action::SubscriptionHasProvider,
                vec![name.clone(), TypedValue::Bool(*has_provider).encode()?],
            ),
            RecordMessage::Error { name, reason } => {
                (Action::Error, vec![name.clone(), reason.clone()])
            }
            RecordMessage::Sync { name } => (Action::Sync, vec![name.clone()]),
            RecordMessage::Listen { action, args } => (*action, args.clone()),
        };
        Ok(Message::new(Topic::Record, action, args))
    }
}

impl TryFrom<&Message> for RecordMessage {
    type Error = ProtocolError;

    fn try_from(message: &Message) -> ProtocolResult<Self> {
        expect_topic(message, Topic::Record)?;
        let name = || -> ProtocolResult<String> { Ok(message.require_arg(0, "name")?.to_string()) };
        Ok(match message.action {
            Action::Subscribe => RecordMessage::Subscribe {
                name: name()?,
                version: message.arg(1).map(str::to_string),
            },
            Action::Unsubscribe => RecordMessage::Unsubscribe { name: name()? },
            Action::Read if message.args.len() < 2 => RecordMessage::Read { name: name()? },
            Action::Read => RecordMessage::Snapshot {
                name: name()?,
                version: message.require_arg(1, "version")?.to_string(),
                data: Value::from_json_str(message.require_arg(2, "data")?)?,
            },
            Action::Update => RecordMessage::Update {
                name: name()?,
                version: message.require_arg(1, "version")?.to_string(),
                data: Value::from_json_str(message.require_arg(2, "data")?)?,
            },
            Action::SubscriptionHasProvider => {
                let flag = TypedValue::decode(message.require_arg(1, "has_provider")?)?;
                let TypedValue::Bool(has_provider) = flag else {
                    return Err(ProtocolError::invalid_message(
                        message,
                        "has_provider must be T or F",
                    ));
                };
                RecordMessage::HasProvider {
                    name: name()?,
                    has_provider,
                }
            }
            Action::Error => RecordMessage::Error {
                name: name()?,
                reason: message.arg(1).unwrap_or_default().to_string(),
            },
            Action::Sync => RecordMessage::Sync { name: name()? },
            Action::Listen
            | Action::Unlisten
            | Action::ListenAccept
            | Action::ListenReject
            | Action::SubscriptionForPatternFound
            | Action::SubscriptionForPatternRemoved => RecordMessage::Listen {
                action: message.action,
                args: message.args.clone(),
            },
            _ => return Err(unexpected_action(message)),
        })
    }
}

fn expect_topic(message: &Message, topic: Topic) -> ProtocolResult<()> {
    if message.topic == topic {
        Ok(())
    } else {
        Err(ProtocolError::invalid_message(
            message,
            format!("expected topic {}", topic.code() as char),
        ))
    }
}

fn unexpected_action(message: &Message) -> ProtocolError {
    ProtocolError::invalid_message(message, "unexpected action for topic")
}

fn optional_typed(arg: Option<&str>) -> ProtocolResult<Option<Value>> {
    match arg {
        None => Ok(None),
        Some(text) => Ok(TypedValue::decode(text)?.into_value()),
    }
}
