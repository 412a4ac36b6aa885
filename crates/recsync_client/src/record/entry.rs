//! A single synchronized record.

use super::cache::RecordCache;
use crate::cancel::CancellationToken;
use crate::connection::MessageSink;
use crate::emitter::{ListenerId, Listeners};
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use parking_lot::Mutex;
use recsync_codec::Value;
use recsync_protocol::{patch, path, version, RecordMessage};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// How far a record has been confirmed. States are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordState {
    /// Not loaded.
    Void,
    /// Loaded locally; not confirmed by the server.
    Client,
    /// Confirmed by the server.
    Server,
    /// Confirmed, but the server considers the version provisional.
    Stale,
    /// An active provider owns the record.
    Provider,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordState::Void => "VOID",
            RecordState::Client => "CLIENT",
            RecordState::Server => "SERVER",
            RecordState::Stale => "STALE",
            RecordState::Provider => "PROVIDER",
        };
        f.write_str(name)
    }
}

/// What subscribers see after each observable change.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    /// Record name.
    pub name: String,
    /// Current version.
    pub version: Option<String>,
    /// Current data.
    pub data: Value,
    /// Current state.
    pub state: RecordState,
}

/// Options for [`Record::wait_for_state`].
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Deadline; defaults to the configured read timeout.
    pub timeout: Option<Duration>,
    /// Cancels the wait.
    pub cancel: Option<CancellationToken>,
}

impl WaitOptions {
    /// Sets the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Options for [`Record::update`].
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// State to reach before the updater runs.
    pub state: RecordState,
    /// Deadline for reaching `state`.
    pub timeout: Option<Duration>,
    /// Cancels the wait.
    pub cancel: Option<CancellationToken>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            state: RecordState::Server,
            timeout: None,
            cancel: None,
        }
    }
}

/// Shared by every record of one handler.
pub(crate) struct RecordContext {
    pub(crate) sink: Arc<dyn MessageSink>,
    pub(crate) user: String,
    pub(crate) cache: Option<Arc<dyn RecordCache>>,
    pub(crate) default_timeout: Duration,
}

struct RecordInner {
    version: Option<String>,
    data: Value,
    state: RecordState,
    refs: usize,
    /// Writes made before the first confirmation, replayed on promotion.
    pending: Vec<(Option<String>, Value)>,
    /// Updates sent but not yet acknowledged or superseded, kept as
    /// encoded frames.
    in_flight: Vec<(String, Bytes)>,
    has_provider: bool,
    disposed: bool,
}

/// A named, versioned document synchronized with the server.
///
/// Obtained through a [`RecordHandle`](super::RecordHandle).
pub struct Record {
    name: String,
    context: Arc<RecordContext>,
    inner: Mutex<RecordInner>,
    state_tx: watch::Sender<RecordState>,
    subscribers: Listeners<RecordSnapshot>,
}

/// Work left over after the record lock is released.
#[derive(Default)]
struct Deferred {
    notify: bool,
    frames: Vec<Bytes>,
    messages: Vec<RecordMessage>,
    cache: Option<(Value, String)>,
    errors: Vec<ClientError>,
}

impl Record {
    pub(crate) fn new(name: &str, context: Arc<RecordContext>) -> Self {
        Self {
            name: name.to_string(),
            context,
            inner: Mutex::new(RecordInner {
                version: None,
                data: Value::empty_object(),
                state: RecordState::Void,
                refs: 0,
                pending: Vec::new(),
                in_flight: Vec::new(),
                has_provider: false,
                disposed: false,
            }),
            state_tx: watch::Sender::new(RecordState::Void),
            subscribers: Listeners::new(),
        }
    }

    /// Record name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> RecordState {
        self.inner.lock().state
    }

    /// Current version.
    pub fn version(&self) -> Option<String> {
        self.inner.lock().version.clone()
    }

    /// Current data.
    pub fn data(&self) -> Value {
        self.inner.lock().data.clone()
    }

    /// Current name, version, data and state.
    pub fn snapshot(&self) -> RecordSnapshot {
        let inner = self.inner.lock();
        self.snapshot_of(&inner)
    }

    /// Number of writes waiting for the first confirmation.
    pub fn pending_writes(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of updates sent but not yet acknowledged.
    pub fn in_flight_writes(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Reads the value at `path`, or the whole document for `None`.
    pub fn get(&self, path: Option<&str>) -> Option<Value> {
        let data = self.data();
        patch::get(&data, path)
    }

    /// Writes `value` at `path`, or merges it into the whole document for
    /// `None`.
    ///
    /// Before the server has confirmed the record the write is queued and
    /// replayed on confirmation. Afterwards it is applied immediately and
    /// sent as an optimistic update.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::InvalidArgument`] for reserved names,
    /// stale or disposed records, bad paths and non-finite numbers, and
    /// with [`ClientError::PacketTooLarge`] when the update does not fit a
    /// frame. Nothing changes on error.
    pub fn set(&self, path: Option<&str>, value: impl Into<Value>) -> ClientResult<()> {
        let value = value.into();
        self.check_write(path, &value)?;

        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock();
            self.check_writable(&inner)?;
            if inner.state < RecordState::Server {
                trace!(record = %self.name, ?path, "write queued until confirmed");
                inner.pending.push((path.map(str::to_string), value));
                return Ok(());
            }

            let data = patch::set(&inner.data, path, &value)?;
            if data.same(&inner.data) {
                return Ok(());
            }
            let frame = self.commit_local(&mut inner, data)?;
            deferred.frames.push(frame);
            deferred.notify = true;
        }
        self.finish(deferred);
        Ok(())
    }

    /// Waits for `options.state`, then replaces the value at `path` with
    /// the updater's result.
    ///
    /// Nothing is written when the updater returns the current value.
    ///
    /// # Errors
    ///
    /// Fails like [`wait_for_state`](Self::wait_for_state) and
    /// [`set`](Self::set).
    pub async fn update<F>(
        &self,
        path: Option<&str>,
        updater: F,
        options: UpdateOptions,
    ) -> ClientResult<()>
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        if let Some(path) = path {
            path::tokenize(path)?;
        }
        self.wait_for_state(
            options.state,
            WaitOptions {
                timeout: options.timeout,
                cancel: options.cancel,
            },
        )
        .await?;

        let current = self.get(path);
        let next = updater(current.clone());
        if current.is_some_and(|current| current.same(&next)) {
            return Ok(());
        }
        self.set(path, next)
    }

    /// Resolves once the state reaches `target`.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Timeout`] naming the current and expected
    /// states, or [`ClientError::Cancelled`].
    pub async fn wait_for_state(
        &self,
        target: RecordState,
        options: WaitOptions,
    ) -> ClientResult<RecordState> {
        let mut rx = self.state_tx.subscribe();
        let timeout = options.timeout.unwrap_or(self.context.default_timeout);
        let cancel = options.cancel;

        tokio::select! {
            biased;
            () = async {
                match &cancel {
                    Some(cancel) => cancel.cancelled().await,
                    None => std::future::pending().await,
                }
            } => Err(ClientError::Cancelled),
            reached = rx.wait_for(|state| *state >= target) => {
                reached.map(|state| *state).map_err(|_| ClientError::Cancelled)
            }
            () = tokio::time::sleep(timeout) => Err(ClientError::Timeout {
                current: self.state().to_string(),
                expected: target.to_string(),
            }),
        }
    }

    /// Registers a callback for every observable change.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RecordSnapshot) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Removes a callback.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub(crate) fn load_local(&self) {
        let cached = self
            .context
            .cache
            .as_ref()
            .and_then(|cache| cache.get(&self.name));
        let mut inner = self.inner.lock();
        if let Some((data, version)) = cached {
            debug!(record = %self.name, %version, "loaded from cache");
            inner.data = data;
            inner.version = Some(version);
        }
        self.set_state(&mut inner, RecordState::Client);
    }

    pub(crate) fn refs(&self) -> usize {
        self.inner.lock().refs
    }

    pub(crate) fn retain(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.refs += 1;
        inner.refs
    }

    pub(crate) fn release(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.refs = inner.refs.saturating_sub(1);
        inner.refs
    }

    pub(crate) fn has_outstanding_writes(&self) -> bool {
        let inner = self.inner.lock();
        !inner.pending.is_empty() || !inner.in_flight.is_empty()
    }

    pub(crate) fn subscribe_message(&self) -> RecordMessage {
        RecordMessage::Subscribe {
            name: self.name.clone(),
            version: self.version(),
        }
    }

    /// Tears the record down and unsubscribes.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::LifecycleInvariantViolation`] while the
    /// record is referenced or has outstanding writes.
    pub(crate) fn dispose(&self) -> ClientResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Ok(());
            }
            let violation = if inner.refs > 0 {
                Some(format!("{} references outstanding", inner.refs))
            } else if !inner.pending.is_empty() || !inner.in_flight.is_empty() {
                Some(format!(
                    "{} pending and {} in-flight writes",
                    inner.pending.len(),
                    inner.in_flight.len()
                ))
            } else {
                None
            };
            if let Some(reason) = violation {
                return Err(ClientError::LifecycleInvariantViolation {
                    name: self.name.clone(),
                    reason,
                });
            }
            inner.disposed = true;
        }

        debug!(record = %self.name, "disposed");
        if self.context.sink.is_connected() {
            let message = RecordMessage::Unsubscribe {
                name: self.name.clone(),
            };
            self.send(&message);
        }
        Ok(())
    }

    /// Applies an inbound record message. Returns false if the message is
    /// not one a record consumes.
    pub(crate) fn handle(&self, message: &RecordMessage) -> bool {
        match message {
            RecordMessage::Snapshot { version, data, .. }
            | RecordMessage::Update { version, data, .. } => self.apply_remote(version, data),
            RecordMessage::HasProvider { has_provider, .. } => self.set_provider(*has_provider),
            RecordMessage::Error { reason, .. } => {
                warn!(record = %self.name, %reason, "record error from server");
                self.context
                    .sink
                    .report_error(ClientError::Server(format!("{}: {reason}", self.name)));
            }
            RecordMessage::Sync { .. } => trace!(record = %self.name, "sync"),
            RecordMessage::Subscribe { .. }
            | RecordMessage::Unsubscribe { .. }
            | RecordMessage::Read { .. }
            | RecordMessage::Listen { .. } => return false,
        }
        true
    }

    pub(crate) fn on_connection_change(&self, connected: bool) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            if connected {
                deferred.messages.push(RecordMessage::Subscribe {
                    name: self.name.clone(),
                    version: inner.version.clone(),
                });
                deferred
                    .frames
                    .extend(inner.in_flight.iter().map(|(_, frame)| frame.clone()));
            } else if inner.state > RecordState::Client {
                self.set_state(&mut inner, RecordState::Client);
                deferred.notify = true;
            }
        }
        self.finish(deferred);
    }

    fn apply_remote(&self, remote_version: &str, remote_data: &Value) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }

            let acknowledged = inner.in_flight.iter().any(|(v, _)| v == remote_version);
            let before = inner.in_flight.len();
            inner.in_flight.retain(|(v, _)| {
                version::compare(Some(v.as_str()), Some(remote_version)) == Ordering::Greater
            });
            let retired = before - inner.in_flight.len();

            if acknowledged {
                trace!(record = %self.name, version = remote_version, retired, "update acknowledged");
            } else {
                if retired > 0 {
                    debug!(
                        record = %self.name,
                        remote = remote_version,
                        retired,
                        "in-flight updates superseded"
                    );
                }
                let ordering = version::compare(Some(remote_version), inner.version.as_deref());
                let accept = ordering == Ordering::Greater
                    || (ordering == Ordering::Equal && version::is_stale(remote_version));
                if accept {
                    match patch::merge(&inner.data, remote_data) {
                        Ok(merged) => {
                            inner.data = merged;
                            inner.version = Some(remote_version.to_string());
                            deferred.cache =
                                Some((inner.data.clone(), remote_version.to_string()));
                            deferred.notify = true;
                        }
                        Err(e) => deferred.errors.push(e.into()),
                    }
                } else {
                    debug!(
                        record = %self.name,
                        remote = remote_version,
                        local = ?inner.version,
                        "discarding update that is not newer"
                    );
                }
            }

            let confirmed = self.confirmed_state(&inner);
            if inner.state < RecordState::Server {
                self.set_state(&mut inner, confirmed);
                deferred.notify = true;
                self.replay_pending(&mut inner, &mut deferred);
            } else if inner.state != confirmed {
                self.set_state(&mut inner, confirmed);
                deferred.notify = true;
            }
        }
        self.finish(deferred);
    }

    fn set_provider(&self, has_provider: bool) {
        let mut deferred = Deferred::default();
        {
            let mut inner = self.inner.lock();
            inner.has_provider = has_provider;
            if inner.state >= RecordState::Server {
                let next = self.confirmed_state(&inner);
                if next != inner.state {
                    self.set_state(&mut inner, next);
                    deferred.notify = true;
                }
            }
        }
        self.finish(deferred);
    }

    fn replay_pending(&self, inner: &mut RecordInner, deferred: &mut Deferred) {
        if inner.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut inner.pending);
        let count = pending.len();

        let mut data = inner.data.clone();
        for (path, value) in &pending {
            match patch::set(&data, path.as_deref(), value) {
                Ok(next) => data = next,
                Err(e) => {
                    deferred.errors.push(e.into());
                    return;
                }
            }
        }
        if data.same(&inner.data) {
            return;
        }
        match self.commit_local(inner, data) {
            Ok(frame) => {
                debug!(record = %self.name, count, "replayed pending writes");
                deferred.frames.push(frame);
            }
            Err(e) => {
                warn!(record = %self.name, error = %e, "dropping pending writes");
                deferred.errors.push(e);
            }
        }
    }

    /// Stamps `data` with the next local version and tracks it in flight.
    fn commit_local(&self, inner: &mut RecordInner, data: Value) -> ClientResult<Bytes> {
        let current = inner.version.as_deref();
        let next = version::next(current, &self.context.user).ok_or_else(|| {
            let reason = if current.is_some_and(version::is_stale) {
                "is stale and read-only"
            } else {
                "has no version after its current one"
            };
            ClientError::InvalidArgument(format!("record {:?} {reason}", self.name))
        })?;
        let message = RecordMessage::Update {
            name: self.name.clone(),
            version: next.clone(),
            data: data.clone(),
        }
        .to_message()?;
        let frame = self.context.sink.encode(&message)?;

        inner.data = data;
        inner.version = Some(next.clone());
        inner.in_flight.push((next, frame.clone()));
        Ok(frame)
    }

    fn confirmed_state(&self, inner: &RecordInner) -> RecordState {
        if inner.has_provider {
            RecordState::Provider
        } else if inner.version.as_deref().is_some_and(version::is_stale) {
            RecordState::Stale
        } else {
            RecordState::Server
        }
    }

    fn set_state(&self, inner: &mut RecordInner, state: RecordState) {
        if inner.state != state {
            debug!(record = %self.name, from = %inner.state, to = %state, "record state changed");
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn check_write(&self, path: Option<&str>, value: &Value) -> ClientResult<()> {
        if self.name.starts_with('_') {
            return Err(ClientError::InvalidArgument(format!(
                "record name {:?} is reserved",
                self.name
            )));
        }
        if let Some(path) = path {
            path::tokenize(path)?;
        }
        value
            .validate()
            .map_err(|e| ClientError::InvalidArgument(e.to_string()))
    }

    fn check_writable(&self, inner: &RecordInner) -> ClientResult<()> {
        if inner.disposed {
            return Err(ClientError::InvalidArgument(format!(
                "record {:?} is disposed",
                self.name
            )));
        }
        if inner.version.as_deref().is_some_and(version::is_stale) {
            return Err(ClientError::InvalidArgument(format!(
                "record {:?} is stale and read-only",
                self.name
            )));
        }
        Ok(())
    }

    fn snapshot_of(&self, inner: &RecordInner) -> RecordSnapshot {
        RecordSnapshot {
            name: self.name.clone(),
            version: inner.version.clone(),
            data: inner.data.clone(),
            state: inner.state,
        }
    }

    fn send(&self, message: &RecordMessage) {
        let sent = message
            .to_message()
            .map_err(ClientError::from)
            .and_then(|message| self.context.sink.send(&message));
        match sent {
            Ok(()) | Err(ClientError::NotConnected) => {}
            Err(e) => self.context.sink.report_error(e),
        }
    }

    fn finish(&self, deferred: Deferred) {
        for message in &deferred.messages {
            self.send(message);
        }
        for frame in deferred.frames {
            match self.context.sink.send_frame(frame) {
                Ok(()) | Err(ClientError::NotConnected) => {}
                Err(e) => self.context.sink.report_error(e),
            }
        }
        if let (Some(cache), Some((data, version))) = (&self.context.cache, deferred.cache) {
            cache.set(&self.name, &data, &version);
        }
        for error in deferred.errors {
            self.context.sink.report_error(error);
        }
        if deferred.notify {
            let snapshot = self.snapshot();
            self.subscribers.emit(&snapshot);
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("refs", &inner.refs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use recsync_codec::{decode_frames, FrameEncoder, Message};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    /// Records what a record sends.
    pub(crate) struct TestSink {
        connected: AtomicBool,
        encoder: Mutex<FrameEncoder>,
        pub(crate) sent: Mutex<Vec<Message>>,
        pub(crate) errors: Mutex<Vec<ClientError>>,
    }

    impl TestSink {
        pub(crate) fn new(connected: bool) -> Arc<Self> {
            Self::with_max_packet_size(connected, recsync_codec::DEFAULT_MAX_PACKET_SIZE)
        }

        pub(crate) fn with_max_packet_size(connected: bool, max: usize) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(connected),
                encoder: Mutex::new(FrameEncoder::with_limits(1024, max)),
                sent: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn set_connected(&self, connected: bool) {
            self.connected.store(connected, AtomicOrdering::SeqCst);
        }

        pub(crate) fn take(&self) -> Vec<RecordMessage> {
            std::mem::take(&mut *self.sent.lock())
                .iter()
                .map(|m| RecordMessage::try_from(m).unwrap())
                .collect()
        }
    }

    impl MessageSink for TestSink {
        fn encode(&self, message: &Message) -> ClientResult<Bytes> {
            Ok(self.encoder.lock().encode(message)?)
        }

        fn send_frame(&self, frame: Bytes) -> ClientResult<()> {
            if !self.is_connected() {
                return Err(ClientError::NotConnected);
            }
            for message in decode_frames(&frame) {
                self.sent.lock().push(message.unwrap());
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(AtomicOrdering::SeqCst)
        }

        fn report_error(&self, error: ClientError) {
            self.errors.lock().push(error);
        }
    }

    pub(crate) fn context(sink: &Arc<TestSink>) -> Arc<RecordContext> {
        Arc::new(RecordContext {
            sink: Arc::clone(sink) as Arc<dyn MessageSink>,
            user: "tester".into(),
            cache: None,
            default_timeout: Duration::from_secs(5),
        })
    }

    fn record(name: &str, sink: &Arc<TestSink>) -> Record {
        let record = Record::new(name, context(sink));
        record.load_local();
        record
    }

    fn json(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    fn snapshot(record: &Record, version: &str, data: serde_json::Value) {
        assert!(record.handle(&RecordMessage::Snapshot {
            name: record.name().to_string(),
            version: version.into(),
            data: json(data),
        }));
    }

    fn update(record: &Record, version: &str, data: serde_json::Value) {
        assert!(record.handle(&RecordMessage::Update {
            name: record.name().to_string(),
            version: version.into(),
            data: json(data),
        }));
    }

    #[test]
    fn state_order_and_names() {
        assert!(RecordState::Void < RecordState::Client);
        assert!(RecordState::Server < RecordState::Stale);
        assert!(RecordState::Stale < RecordState::Provider);
        assert_eq!(RecordState::Server.to_string(), "SERVER");
    }

    #[test]
    fn pending_write_replays_once_on_confirmation() {
        let sink = TestSink::new(false);
        let doc = record("doc", &sink);
        doc.set(Some("a"), 1).unwrap();
        assert_eq!(doc.pending_writes(), 1);
        assert_eq!(doc.get(None), Some(Value::empty_object()));

        sink.set_connected(true);
        snapshot(&doc, "1-srv-s", json!({"b": 2}));

        assert_eq!(doc.state(), RecordState::Server);
        let expected = Value::from_json_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(doc.get(None), Some(expected.clone()));
        assert_eq!(doc.pending_writes(), 0);
        assert_eq!(doc.in_flight_writes(), 1);

        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        let RecordMessage::Update { version, data, .. } = &sent[0] else {
            panic!("expected update, got {sent:?}");
        };
        assert!(version.starts_with("2-"));
        assert!(version.ends_with("-tester"));
        assert_eq!(data, &expected);

        // A second snapshot does not replay anything again.
        snapshot(&doc, "1-srv-s", json!({"b": 2}));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn acknowledged_update_is_retired() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({}));
        doc.set(Some("x"), 5).unwrap();
        let version = doc.version().unwrap();
        assert_eq!(doc.in_flight_writes(), 1);

        update(&doc, &version, json!({"x": 5}));
        assert_eq!(doc.in_flight_writes(), 0);
        assert_eq!(doc.get(Some("x")), Some(Value::from(5)));
    }

    #[test]
    fn newer_remote_version_supersedes_in_flight_updates() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({}));
        doc.set(Some("a"), 1).unwrap();
        doc.set(Some("a"), 2).unwrap();
        assert_eq!(doc.in_flight_writes(), 2);
        assert!(doc.has_outstanding_writes());

        update(&doc, "3-zzz-other", json!({"a": 7}));
        assert_eq!(doc.in_flight_writes(), 0);
        assert!(!doc.has_outstanding_writes());
        assert_eq!(doc.get(Some("a")), Some(Value::from(7)));
        sink.take();

        doc.on_connection_change(true);
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Subscribe {
                name: "doc".into(),
                version: Some("3-zzz-other".into())
            }]
        );
    }

    #[test]
    fn acknowledging_a_later_update_retires_earlier_ones() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({}));
        doc.set(Some("a"), 1).unwrap();
        doc.set(Some("a"), 2).unwrap();
        let latest = doc.version().unwrap();

        update(&doc, &latest, json!({"a": 2}));
        assert_eq!(doc.in_flight_writes(), 0);
        assert_eq!(doc.version(), Some(latest));
    }

    #[test]
    fn exhausted_version_sequence_rejects_writes() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        let last = format!("{}-a-s", u64::MAX);
        snapshot(&doc, &last, json!({"a": 0}));

        assert!(matches!(
            doc.set(Some("a"), 1),
            Err(ClientError::InvalidArgument(_))
        ));
        assert_eq!(doc.get(Some("a")), Some(Value::from(0)));
        assert_eq!(doc.version(), Some(last));
        assert_eq!(doc.in_flight_writes(), 0);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn older_and_duplicate_updates_are_discarded() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "3-b-s", json!({"v": 3}));
        update(&doc, "2-z-s", json!({"v": 2}));
        update(&doc, "3-b-s", json!({"v": 99}));
        assert_eq!(doc.get(Some("v")), Some(Value::from(3)));

        update(&doc, "3-c-s", json!({"v": 4}));
        assert_eq!(doc.get(Some("v")), Some(Value::from(4)));
        assert_eq!(doc.version().as_deref(), Some("3-c-s"));
    }

    #[test]
    fn newer_update_shares_unchanged_subtrees() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({"keep": {"deep": [1, 2]}, "n": 1}));
        let before = doc.get(Some("keep")).unwrap();

        update(&doc, "2-a-s", json!({"keep": {"deep": [1, 2]}, "n": 2}));
        let after = doc.get(Some("keep")).unwrap();
        assert!(before.same(&after));
        assert_eq!(doc.get(Some("n")), Some(Value::from(2)));
    }

    #[test]
    fn stale_version_promotes_to_stale_and_freezes() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "I-a-s", json!({"x": 1}));
        assert_eq!(doc.state(), RecordState::Stale);
        assert!(matches!(
            doc.set(Some("x"), 2),
            Err(ClientError::InvalidArgument(_))
        ));

        // Equal stale versions are re-applied.
        update(&doc, "I-a-s", json!({"x": 3}));
        assert_eq!(doc.get(Some("x")), Some(Value::from(3)));
    }

    #[test]
    fn stale_version_after_confirmation_moves_to_stale() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "4-a-s", json!({"x": 1}));
        assert_eq!(doc.state(), RecordState::Server);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        doc.subscribe(move |s| log.lock().push(s.state));

        update(&doc, "I-b-s", json!({"x": 2}));
        assert_eq!(doc.state(), RecordState::Stale);
        assert_eq!(*seen.lock(), vec![RecordState::Stale]);
        assert!(doc.set(Some("x"), 3).is_err());
    }

    #[test]
    fn invalid_writes_change_nothing() {
        let sink = TestSink::new(true);
        let reserved = record("_internal", &sink);
        assert!(matches!(
            reserved.set(None, json(json!({"a": 1}))),
            Err(ClientError::InvalidArgument(_))
        ));

        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({"a": 1}));
        assert!(doc.set(Some("a[0"), 1).is_err());
        assert!(matches!(
            doc.set(Some("a"), f64::NAN),
            Err(ClientError::InvalidArgument(_))
        ));
        assert_eq!(doc.version().as_deref(), Some("1-a-s"));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn oversized_write_is_rejected_without_mutation() {
        let sink = TestSink::with_max_packet_size(true, 64);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({}));
        let result = doc.set(Some("blob"), "x".repeat(100));
        assert!(matches!(result, Err(ClientError::PacketTooLarge { max: 64, .. })));
        assert_eq!(doc.get(None), Some(Value::empty_object()));
        assert_eq!(doc.in_flight_writes(), 0);
    }

    #[test]
    fn setting_current_value_sends_nothing() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({"a": 1}));
        doc.set(Some("a"), 1).unwrap();
        assert!(sink.take().is_empty());
        assert_eq!(doc.version().as_deref(), Some("1-a-s"));
    }

    #[test]
    fn provider_toggles_state() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        doc.handle(&RecordMessage::HasProvider {
            name: "doc".into(),
            has_provider: true,
        });
        assert_eq!(doc.state(), RecordState::Client);

        snapshot(&doc, "1-a-s", json!({}));
        assert_eq!(doc.state(), RecordState::Provider);

        doc.handle(&RecordMessage::HasProvider {
            name: "doc".into(),
            has_provider: false,
        });
        assert_eq!(doc.state(), RecordState::Server);
    }

    #[test]
    fn disconnect_clamps_and_reconnect_retransmits() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({}));
        doc.set(Some("x"), 1).unwrap();
        let first = sink.take();

        sink.set_connected(false);
        doc.on_connection_change(false);
        assert_eq!(doc.state(), RecordState::Client);
        assert_eq!(doc.in_flight_writes(), 1);

        sink.set_connected(true);
        doc.on_connection_change(true);
        let sent = sink.take();
        assert_eq!(
            sent[0],
            RecordMessage::Subscribe {
                name: "doc".into(),
                version: doc.version()
            }
        );
        assert_eq!(sent[1..], first[..]);
    }

    #[test]
    fn subscribers_see_every_change() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let id = doc.subscribe(move |s| log.lock().push((s.state, s.version.clone())));

        snapshot(&doc, "1-a-s", json!({"a": 1}));
        doc.set(Some("a"), 2).unwrap();
        assert!(doc.unsubscribe(id));
        update(&doc, "9-z-s", json!({"a": 3}));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (RecordState::Server, Some("1-a-s".to_string())));
        assert_eq!(seen[1].0, RecordState::Server);
    }

    #[test]
    fn dispose_checks_lifecycle() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        doc.retain();
        assert!(matches!(
            doc.dispose(),
            Err(ClientError::LifecycleInvariantViolation { .. })
        ));
        doc.release();
        doc.dispose().unwrap();
        doc.dispose().unwrap();
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Unsubscribe { name: "doc".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_with_state_names() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        let result = doc
            .wait_for_state(
                RecordState::Server,
                WaitOptions::default().with_timeout(Duration::from_secs(2)),
            )
            .await;
        assert_eq!(
            result,
            Err(ClientError::Timeout {
                current: "CLIENT".into(),
                expected: "SERVER".into()
            })
        );
    }

    #[tokio::test]
    async fn wait_is_cancelled() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = doc
            .wait_for_state(RecordState::Server, WaitOptions::default().with_cancel(cancel))
            .await;
        assert_eq!(result, Err(ClientError::Cancelled));
    }

    #[tokio::test]
    async fn wait_is_cancelled_while_pending() {
        let sink = TestSink::new(true);
        let doc = Arc::new(record("doc", &sink));
        let cancel = CancellationToken::new();
        let waiter = {
            let doc = Arc::clone(&doc);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                doc.wait_for_state(RecordState::Server, WaitOptions::default().with_cancel(cancel))
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(ClientError::Cancelled));

        // The record is untouched and a later promotion still works.
        snapshot(&doc, "1-a-s", json!({}));
        assert_eq!(doc.state(), RecordState::Server);
    }

    #[tokio::test]
    async fn wait_resolves_on_promotion() {
        let sink = TestSink::new(true);
        let doc = Arc::new(record("doc", &sink));
        let waiter = {
            let doc = Arc::clone(&doc);
            tokio::spawn(async move {
                doc.wait_for_state(RecordState::Server, WaitOptions::default())
                    .await
            })
        };
        tokio::task::yield_now().await;
        snapshot(&doc, "1-a-s", json!({}));
        assert_eq!(waiter.await.unwrap(), Ok(RecordState::Server));
    }

    #[tokio::test]
    async fn update_applies_updater_after_confirmation() {
        let sink = TestSink::new(true);
        let doc = record("doc", &sink);
        snapshot(&doc, "1-a-s", json!({"count": 1}));

        doc.update(
            Some("count"),
            |current| {
                let n = current.and_then(|v| v.as_f64()).unwrap_or(0.0);
                Value::from(n + 1.0)
            },
            UpdateOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(doc.get(Some("count")), Some(Value::from(2)));
        assert_eq!(sink.take().len(), 1);

        doc.update(Some("count"), |current| current.unwrap_or(Value::Null), UpdateOptions::default())
            .await
            .unwrap();
        assert!(sink.take().is_empty());
    }
}
