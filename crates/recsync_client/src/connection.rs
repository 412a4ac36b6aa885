//! Connection state machine.
//!
//! The connection owns the transport lifecycle: handshake, authentication,
//! heartbeat supervision, reconnect with linear backoff and outbound
//! batching. It is sans-IO: the host reports transport events through the
//! `handle_*` methods and advances time through [`Connection::tick`].
//!
//! All state lives behind one lock. Handlers compute their effects while
//! holding it and run them after releasing it, so callbacks, transport
//! calls and topic handlers never observe a held lock and may call back
//! into the connection.

use crate::config::ClientConfig;
use crate::emitter::{ListenerId, Listeners};
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use recsync_codec::{FrameDecoder, FrameEncoder, Message, Payload, Topic, Value};
use recsync_protocol::{reason, AuthMessage, ConnectionMessage};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// The current state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected and not trying to.
    Closed,
    /// Transport is opening or open; waiting for the server handshake.
    AwaitingConnection,
    /// Answering a server challenge.
    Challenging,
    /// Handshake done; waiting for credentials.
    AwaitingAuthentication,
    /// Credentials sent; waiting for the verdict.
    Authenticating,
    /// Authenticated; record traffic flows.
    Open,
    /// The transport reported an error; a close is expected next.
    Error,
    /// Waiting to retry after an unexpected close.
    Reconnecting,
}

impl ConnectionState {
    /// Returns true while the connection is trying to become open.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::AwaitingConnection
                | ConnectionState::Challenging
                | ConnectionState::AwaitingAuthentication
                | ConnectionState::Authenticating
                | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::AwaitingConnection => "AWAITING_CONNECTION",
            ConnectionState::Challenging => "CHALLENGING",
            ConnectionState::AwaitingAuthentication => "AWAITING_AUTHENTICATION",
            ConnectionState::Authenticating => "AUTHENTICATING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Error => "ERROR",
            ConnectionState::Reconnecting => "RECONNECTING",
        };
        f.write_str(name)
    }
}

/// Something observable happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The state changed.
    StateChanged(ConnectionState),
    /// The connection entered (`true`) or left (`false`) [`ConnectionState::Open`].
    Connected(bool),
    /// A reconnect attempt was scheduled.
    ReconnectScheduled {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The reconnect budget is spent; the connection is closed for good.
    MaxReconnectAttemptsReached,
    /// An error was reported on the process-wide error channel.
    Error(ClientError),
}

/// Counters describing connection traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Inbound messages dispatched.
    pub messages_received: u64,
    /// Outbound frames accepted for sending.
    pub messages_sent: u64,
    /// Transport writes performed.
    pub chunks_written: u64,
    /// Inbound frames that failed to decode.
    pub parse_errors: u64,
    /// Reconnect attempts scheduled.
    pub reconnects: u64,
    /// Last error reported.
    pub last_error: Option<String>,
}

/// Receives inbound messages for one topic.
pub trait TopicHandler: Send + Sync {
    /// Handles a message. Returns false if the message was not for this
    /// handler.
    fn handle(&self, message: &Message) -> bool;

    /// Called when the connection enters or leaves the open state.
    fn on_connection_change(&self, connected: bool);
}

/// Outbound side of the connection as seen by topic handlers.
pub trait MessageSink: Send + Sync {
    /// Encodes a message without sending it.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::PacketTooLarge`] when the frame exceeds
    /// the packet limit.
    fn encode(&self, message: &Message) -> ClientResult<Bytes>;

    /// Queues an encoded frame.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::NotConnected`] unless the connection is open.
    fn send_frame(&self, frame: Bytes) -> ClientResult<()>;

    /// Encodes and queues a message.
    fn send(&self, message: &Message) -> ClientResult<()> {
        let frame = self.encode(message)?;
        self.send_frame(frame)
    }

    /// Returns true if the connection is open.
    fn is_connected(&self) -> bool;

    /// Reports an error on the process-wide error channel.
    fn report_error(&self, error: ClientError);
}

/// Completion callback for [`Connection::login`].
pub type AuthCallback = Box<dyn FnOnce(ClientResult<Option<Value>>) + Send>;

enum Effect {
    Event(ConnectionEvent),
    Connected(bool),
    Send(Message),
    Open(String),
    Close,
    Auth(AuthCallback, ClientResult<Option<Value>>),
}

struct ConnectionInner {
    state: ConnectionState,
    original_url: String,
    url: String,
    transport_up: bool,
    attempts: u32,
    reconnect_at: Option<Instant>,
    deliberate_close: bool,
    terminal: bool,
    redirecting: bool,
    auth_params: Option<Value>,
    auth_callback: Option<AuthCallback>,
    inbound: VecDeque<Message>,
    draining: bool,
    in_pass: bool,
    outbound: Vec<Bytes>,
    flush_scheduled: bool,
    last_inbound: Instant,
    stats: ConnectionStats,
}

impl ConnectionInner {
    fn transition(&mut self, next: ConnectionState, effects: &mut Vec<Effect>) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        debug!(from = %previous, to = %next, "connection state changed");
        effects.push(Effect::Event(ConnectionEvent::StateChanged(next)));
        if next == ConnectionState::Open {
            effects.push(Effect::Connected(true));
        } else if previous == ConnectionState::Open {
            effects.push(Effect::Connected(false));
        }
    }

    fn fail_auth(&mut self, error: ClientError, effects: &mut Vec<Effect>) {
        if let Some(callback) = self.auth_callback.take() {
            effects.push(Effect::Auth(callback, Err(error)));
        }
    }

    /// Closes for good: no reconnect follows.
    fn shutdown(&mut self, effects: &mut Vec<Effect>) {
        self.reconnect_at = None;
        self.redirecting = false;
        self.transition(ConnectionState::Closed, effects);
        if self.transport_up {
            effects.push(Effect::Close);
        }
    }

    fn schedule_reconnect(&mut self, config: &ClientConfig, effects: &mut Vec<Effect>) {
        self.url.clone_from(&self.original_url);
        if self.attempts >= config.reconnect.max_attempts {
            warn!(attempts = self.attempts, "max reconnect attempts reached");
            self.reconnect_at = None;
            self.transition(ConnectionState::Closed, effects);
            self.fail_auth(ClientError::NotConnected, effects);
            effects.push(Effect::Event(ConnectionEvent::MaxReconnectAttemptsReached));
            return;
        }
        self.attempts += 1;
        self.stats.reconnects += 1;
        let delay = config.reconnect.delay_for_attempt(self.attempts);
        self.reconnect_at = Some(Instant::now() + delay);
        self.transition(ConnectionState::Reconnecting, effects);
        info!(attempt = self.attempts, ?delay, "reconnect scheduled");
        effects.push(Effect::Event(ConnectionEvent::ReconnectScheduled {
            attempt: self.attempts,
            delay,
        }));
    }

    fn auth_request(&mut self, effects: &mut Vec<Effect>) {
        let Some(params) = self.auth_params.clone() else {
            return;
        };
        match (AuthMessage::Request { params }).to_message() {
            Ok(message) => {
                effects.push(Effect::Send(message));
                self.transition(ConnectionState::Authenticating, effects);
            }
            Err(e) => {
                self.auth_params = None;
                self.fail_auth(e.into(), effects);
            }
        }
    }
}

/// A client connection to one server.
pub struct Connection {
    me: Weak<Connection>,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    inner: Mutex<ConnectionInner>,
    encoder: Mutex<FrameEncoder>,
    handlers: RwLock<Vec<(Topic, Weak<dyn TopicHandler>)>>,
    events: Listeners<ConnectionEvent>,
}

impl Connection {
    /// Creates a closed connection to `url`.
    pub fn new(url: impl Into<String>, config: ClientConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let url = url.into();
        let encoder = FrameEncoder::with_limits(
            recsync_codec::DEFAULT_CHUNK_CAPACITY,
            config.max_packet_size,
        );
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Closed,
                original_url: url.clone(),
                url,
                transport_up: false,
                attempts: 0,
                reconnect_at: None,
                deliberate_close: false,
                terminal: false,
                redirecting: false,
                auth_params: None,
                auth_callback: None,
                inbound: VecDeque::new(),
                draining: false,
                in_pass: false,
                outbound: Vec::new(),
                flush_scheduled: false,
                last_inbound: Instant::now(),
                stats: ConnectionStats::default(),
            }),
            encoder: Mutex::new(encoder),
            handlers: RwLock::new(Vec::new()),
            events: Listeners::new(),
            config,
        })
    }

    /// Gets the current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Gets the URL currently dialled.
    pub fn url(&self) -> String {
        self.inner.lock().url.clone()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ConnectionStats {
        self.inner.lock().stats.clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Registers a callback for connection events.
    pub fn on_event<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Removes an event callback.
    pub fn off_event(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Routes messages of `topic` to `handler`.
    ///
    /// The connection keeps a weak reference; the caller owns the handler.
    pub fn register_handler(&self, topic: Topic, handler: &Arc<dyn TopicHandler>) {
        self.handlers.write().push((topic, Arc::downgrade(handler)));
    }

    /// Starts connecting.
    ///
    /// Clears any terminal condition left by an earlier session. Does
    /// nothing unless the connection is closed.
    pub fn connect(&self) {
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Closed {
                debug!(state = %inner.state, "connect ignored");
                return;
            }
            inner.deliberate_close = false;
            inner.terminal = false;
            inner.attempts = 0;
            let home = inner.original_url.clone();
            inner.url = home;
            inner.transition(ConnectionState::AwaitingConnection, &mut effects);
            effects.push(Effect::Open(inner.url.clone()));
        }
        self.apply(effects);
    }

    /// Authenticates with `params`; `callback` receives the outcome.
    ///
    /// Params are kept and replayed after every reconnect. If the handshake
    /// has not completed yet they are sent as soon as it does.
    ///
    /// # Errors
    ///
    /// Rejects params holding non-finite numbers, and logins while already
    /// open or after a terminal failure.
    pub fn login(&self, params: Value, callback: AuthCallback) -> ClientResult<()> {
        params
            .validate()
            .map_err(|e| ClientError::InvalidArgument(format!("auth params: {e}")))?;
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Open {
                return Err(ClientError::InvalidArgument("already authenticated".into()));
            }
            if inner.terminal {
                return Err(ClientError::AuthDenied);
            }
            inner.fail_auth(ClientError::Cancelled, &mut effects);
            inner.auth_params = Some(params);
            inner.auth_callback = Some(callback);
            if inner.state == ConnectionState::AwaitingAuthentication {
                inner.auth_request(&mut effects);
            }
        }
        self.apply(effects);
        Ok(())
    }

    /// Closes deliberately. No reconnect follows.
    pub fn close(&self) {
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.deliberate_close = true;
            inner.fail_auth(ClientError::Cancelled, &mut effects);
            inner.shutdown(&mut effects);
        }
        self.apply(effects);
    }

    /// Advances timers: due reconnects and heartbeat supervision.
    pub fn tick(&self, now: Instant) {
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.reconnect_at.is_some_and(|at| now >= at) {
                inner.reconnect_at = None;
                if inner.state == ConnectionState::Reconnecting {
                    debug!(attempt = inner.attempts, url = %inner.url, "reconnecting");
                    effects.push(Effect::Open(inner.url.clone()));
                }
            }

            let window = self.config.heartbeat_interval.saturating_mul(2);
            if inner.transport_up
                && inner.state != ConnectionState::Closed
                && now.saturating_duration_since(inner.last_inbound) >= window
            {
                warn!(?window, "no inbound traffic within heartbeat window");
                inner.last_inbound = now;
                inner.stats.last_error = Some(ClientError::HeartbeatTimeout.to_string());
                effects.push(Effect::Event(ConnectionEvent::Error(
                    ClientError::HeartbeatTimeout,
                )));
                effects.push(Effect::Close);
            }
        }
        self.apply(effects);
    }

    /// The transport finished opening.
    pub fn handle_open(&self) {
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.deliberate_close || inner.terminal {
                effects.push(Effect::Close);
            } else {
                inner.transport_up = true;
                inner.attempts = 0;
                inner.reconnect_at = None;
                inner.redirecting = false;
                inner.last_inbound = Instant::now();
                inner.transition(ConnectionState::AwaitingConnection, &mut effects);
            }
        }
        self.apply(effects);
    }

    /// The transport delivered a chunk of one or more frames.
    pub fn handle_message(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        let mut messages = Vec::new();
        let decoder =
            FrameDecoder::new(payload.as_bytes()).with_max_frame_size(self.config.max_packet_size);
        for frame in decoder {
            match frame {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                    self.inner.lock().stats.parse_errors += 1;
                    self.report_error(ClientError::inbound(e));
                }
            }
        }

        let schedule = {
            let mut inner = self.inner.lock();
            inner.last_inbound = Instant::now();
            trace!(count = messages.len(), "frames received");
            inner.inbound.extend(messages);
            if inner.draining || inner.inbound.is_empty() {
                false
            } else {
                inner.draining = true;
                true
            }
        };
        if schedule {
            self.schedule(Connection::drain);
        }
    }

    /// The transport reported an error.
    pub fn handle_error(&self, message: impl Into<String>) {
        let error = ClientError::transport_retryable(message);
        warn!(error = %error, "transport error");
        let mut effects = vec![Effect::Event(ConnectionEvent::Error(error.clone()))];
        {
            let mut inner = self.inner.lock();
            inner.stats.last_error = Some(error.to_string());
            if inner.transport_up && inner.state != ConnectionState::Closed {
                inner.transition(ConnectionState::Error, &mut effects);
            }
        }
        self.apply(effects);
    }

    /// The transport closed.
    pub fn handle_close(&self) {
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.transport_up = false;
            inner.outbound.clear();
            if inner.state == ConnectionState::Closed {
                return;
            }
            if inner.redirecting {
                inner.redirecting = false;
                inner.transition(ConnectionState::Reconnecting, &mut effects);
                info!(url = %inner.url, "following redirect");
                effects.push(Effect::Open(inner.url.clone()));
            } else if inner.deliberate_close || inner.terminal {
                inner.transition(ConnectionState::Closed, &mut effects);
            } else {
                inner.schedule_reconnect(&self.config, &mut effects);
            }
        }
        self.apply(effects);
    }

    fn drain(&self) {
        let started = Instant::now();
        self.inner.lock().in_pass = true;

        let mut processed = 0;
        while processed < self.config.batch_size {
            if self
                .config
                .drain_deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
            {
                break;
            }
            let Some(message) = self.inner.lock().inbound.pop_front() else {
                break;
            };
            self.dispatch(&message);
            processed += 1;
        }

        let (more, flush) = {
            let mut inner = self.inner.lock();
            inner.in_pass = false;
            inner.stats.messages_received += processed as u64;
            let more = !inner.inbound.is_empty();
            inner.draining = more;
            let flush = !inner.outbound.is_empty() && !inner.flush_scheduled;
            inner.flush_scheduled |= flush;
            (more, flush)
        };
        trace!(processed, more, "drain pass finished");
        if flush {
            self.flush();
        }
        if more {
            self.schedule(Connection::drain);
        }
    }

    fn dispatch(&self, message: &Message) {
        match message.topic {
            Topic::Connection => self.on_connection_message(message),
            Topic::Auth => self.on_auth_message(message),
            topic => {
                let handlers: Vec<_> = self
                    .handlers
                    .read()
                    .iter()
                    .filter(|(t, _)| *t == topic)
                    .filter_map(|(_, h)| h.upgrade())
                    .collect();
                if !handlers.iter().any(|h| h.handle(message)) {
                    debug!(%message, "unhandled message");
                }
            }
        }
    }

    fn on_connection_message(&self, message: &Message) {
        let parsed = match ConnectionMessage::try_from(message) {
            Ok(parsed) => parsed,
            Err(e) => return self.report_error(e.into()),
        };
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            match parsed {
                ConnectionMessage::Ping => {
                    effects.push(Effect::Send(ConnectionMessage::Pong.to_message()));
                }
                ConnectionMessage::Pong => {}
                ConnectionMessage::Ack => {
                    inner.transition(ConnectionState::AwaitingAuthentication, &mut effects);
                    inner.auth_request(&mut effects);
                }
                ConnectionMessage::Challenge => {
                    inner.transition(ConnectionState::Challenging, &mut effects);
                    let url = inner.url.clone();
                    effects.push(Effect::Send(
                        ConnectionMessage::ChallengeResponse { url }.to_message(),
                    ));
                }
                ConnectionMessage::Rejection => {
                    warn!("connection rejected by server");
                    inner.terminal = true;
                    inner.fail_auth(ClientError::AuthDenied, &mut effects);
                    effects.push(Effect::Event(ConnectionEvent::Error(ClientError::AuthDenied)));
                    inner.shutdown(&mut effects);
                }
                ConnectionMessage::Redirect { url } => {
                    info!(%url, "redirected");
                    inner.url = url;
                    inner.redirecting = true;
                    effects.push(Effect::Close);
                }
                ConnectionMessage::Error { reason } => {
                    if reason == reason::CONNECTION_AUTHENTICATION_TIMEOUT {
                        Self::auth_timeout(&mut inner, &mut effects);
                    } else {
                        effects.push(Effect::Event(ConnectionEvent::Error(ClientError::Server(
                            reason,
                        ))));
                    }
                }
                ConnectionMessage::ChallengeResponse { .. } => {
                    debug!(%message, "unexpected message from server");
                }
            }
        }
        self.apply(effects);
    }

    fn on_auth_message(&self, message: &Message) {
        let parsed = match AuthMessage::try_from(message) {
            Ok(parsed) => parsed,
            Err(e) => return self.report_error(e.into()),
        };
        let mut effects = Vec::new();
        {
            let mut inner = self.inner.lock();
            match parsed {
                AuthMessage::Ack { identity } if inner.state == ConnectionState::Authenticating => {
                    info!("authenticated");
                    inner.transition(ConnectionState::Open, &mut effects);
                    if let Some(callback) = inner.auth_callback.take() {
                        effects.push(Effect::Auth(callback, Ok(identity)));
                    }
                }
                AuthMessage::Error { reason, .. } if reason == reason::TOO_MANY_AUTH_ATTEMPTS => {
                    warn!("too many authentication attempts");
                    inner.terminal = true;
                    inner.fail_auth(ClientError::TooManyAuthAttempts, &mut effects);
                    effects.push(Effect::Event(ConnectionEvent::Error(
                        ClientError::TooManyAuthAttempts,
                    )));
                    inner.shutdown(&mut effects);
                }
                AuthMessage::Error { reason, .. }
                    if reason == reason::CONNECTION_AUTHENTICATION_TIMEOUT =>
                {
                    Self::auth_timeout(&mut inner, &mut effects);
                }
                AuthMessage::Error { reason, .. } => {
                    debug!(%reason, "authentication failed");
                    inner.auth_params = None;
                    inner.transition(ConnectionState::AwaitingAuthentication, &mut effects);
                    inner.fail_auth(ClientError::AuthFailed { reason }, &mut effects);
                }
                other => debug!(?other, state = %inner.state, "ignoring auth message"),
            }
        }
        self.apply(effects);
    }

    fn auth_timeout(inner: &mut ConnectionInner, effects: &mut Vec<Effect>) {
        warn!("authentication timed out");
        inner.terminal = true;
        inner.fail_auth(ClientError::AuthTimeout, effects);
        effects.push(Effect::Event(ConnectionEvent::Error(ClientError::AuthTimeout)));
        inner.shutdown(effects);
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Event(event) => {
                    if let ConnectionEvent::Error(error) = &event {
                        self.inner.lock().stats.last_error = Some(error.to_string());
                    }
                    self.events.emit(&event);
                }
                Effect::Connected(connected) => {
                    self.events.emit(&ConnectionEvent::Connected(connected));
                    let handlers: Vec<_> = self
                        .handlers
                        .read()
                        .iter()
                        .filter_map(|(_, h)| h.upgrade())
                        .collect();
                    for handler in handlers {
                        handler.on_connection_change(connected);
                    }
                }
                Effect::Send(message) => match self.encode(&message) {
                    Ok(frame) => self.enqueue(frame),
                    Err(e) => self.report_error(e),
                },
                Effect::Open(url) => {
                    if let Err(e) = self.transport.open(&url) {
                        warn!(%url, error = %e, "transport failed to open");
                        self.report_error(e);
                        self.handle_close();
                    }
                }
                Effect::Close => self.transport.close(),
                Effect::Auth(callback, result) => callback(result),
            }
        }
    }

    fn enqueue(&self, frame: Bytes) {
        let schedule = {
            let mut inner = self.inner.lock();
            inner.outbound.push(frame);
            inner.stats.messages_sent += 1;
            if inner.in_pass || inner.flush_scheduled {
                false
            } else {
                inner.flush_scheduled = true;
                true
            }
        };
        if schedule {
            self.schedule(Connection::flush);
        }
    }

    /// Writes queued frames, packing them into chunks of at most
    /// `max_packet_size` bytes.
    fn flush(&self) {
        let frames = {
            let mut inner = self.inner.lock();
            inner.flush_scheduled = false;
            if !inner.transport_up {
                inner.outbound.clear();
                return;
            }
            std::mem::take(&mut inner.outbound)
        };

        let max = self.config.max_packet_size;
        let mut chunks = Vec::new();
        let mut chunk = BytesMut::new();
        for frame in frames {
            if !chunk.is_empty() && chunk.len() + frame.len() > max {
                chunks.push(chunk.split().freeze());
            }
            chunk.extend_from_slice(&frame);
        }
        if !chunk.is_empty() {
            chunks.push(chunk.freeze());
        }

        for chunk in chunks {
            let written = self.transport.send(chunk);
            self.inner.lock().stats.chunks_written += 1;
            if let Err(e) = written {
                warn!(error = %e, "transport write failed");
                self.report_error(e);
            }
        }
    }

    fn schedule(&self, task: fn(&Connection)) {
        let me = self.me.clone();
        self.config.scheduler.schedule(Box::new(move || {
            if let Some(connection) = me.upgrade() {
                task(&connection);
            }
        }));
    }
}

impl MessageSink for Connection {
    fn encode(&self, message: &Message) -> ClientResult<Bytes> {
        Ok(self.encoder.lock().encode(message)?)
    }

    fn send_frame(&self, frame: Bytes) -> ClientResult<()> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }
        self.enqueue(frame);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn report_error(&self, error: ClientError) {
        self.inner.lock().stats.last_error = Some(error.to_string());
        self.events.emit(&ConnectionEvent::Error(error));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Connection")
            .field("state", &inner.state)
            .field("url", &inner.url)
            .field("attempts", &inner.attempts)
            .finish_non_exhaustive()
    }
}
