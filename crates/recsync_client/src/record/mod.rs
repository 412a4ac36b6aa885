//! Record engine.
//!
//! The [`RecordHandler`] owns the registry of live records, routes
//! record-topic messages to them and disposes records nobody references.
//! Callers hold records through a [`RecordHandle`], which keeps a
//! reference for as long as it lives.
//!
//! Records whose reference count drops to zero are not torn down at once;
//! they wait in a pruning set that is swept every `prune_interval`, so a
//! quick release/acquire cycle costs no unsubscribe/subscribe round trip.
//!
//! Lock order: registry before record.

mod cache;
mod entry;

pub use cache::{MemoryCache, RecordCache};
pub use entry::{Record, RecordSnapshot, RecordState, UpdateOptions, WaitOptions};

use crate::config::ClientConfig;
use crate::connection::{MessageSink, TopicHandler};
use crate::error::{ClientError, ClientResult};
use entry::RecordContext;
use parking_lot::Mutex;
use recsync_codec::Message;
use recsync_protocol::RecordMessage;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

struct Registry {
    records: HashMap<String, Arc<Record>>,
    pruning: BTreeSet<String>,
    last_prune: Option<Instant>,
}

/// Registry and message router for records.
pub struct RecordHandler {
    context: Arc<RecordContext>,
    prune_interval: Duration,
    registry: Mutex<Registry>,
}

impl RecordHandler {
    /// Creates a handler sending through `sink`.
    pub fn new(sink: Arc<dyn MessageSink>, config: &ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            context: Arc::new(RecordContext {
                sink,
                user: config.user.clone(),
                cache: config.cache.clone(),
                default_timeout: config.default_read_timeout,
            }),
            prune_interval: config.prune_interval,
            registry: Mutex::new(Registry {
                records: HashMap::new(),
                pruning: BTreeSet::new(),
                last_prune: None,
            }),
        })
    }

    /// Gets or creates the record `name` and takes a reference to it.
    ///
    /// A new record is loaded from the cache, if any, and subscribed when
    /// the connection is open.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::InvalidArgument`] for an empty name.
    pub fn acquire(self: &Arc<Self>, name: &str) -> ClientResult<RecordHandle> {
        if name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "record name must not be empty".into(),
            ));
        }

        let (record, created) = {
            let mut registry = self.registry.lock();
            match registry.records.get(name) {
                Some(record) => {
                    let record = Arc::clone(record);
                    record.retain();
                    registry.pruning.remove(name);
                    (record, false)
                }
                None => {
                    let record = Arc::new(Record::new(name, Arc::clone(&self.context)));
                    record.load_local();
                    record.retain();
                    registry
                        .records
                        .insert(name.to_string(), Arc::clone(&record));
                    (record, true)
                }
            }
        };

        if created {
            debug!(record = name, "record created");
            if self.context.sink.is_connected() {
                self.send(&record.subscribe_message());
            }
        }

        Ok(RecordHandle {
            record,
            handler: Arc::clone(self),
        })
    }

    fn retain(&self, record: &Record) {
        let _registry = self.registry.lock();
        record.retain();
    }

    fn release(&self, record: &Record) {
        let mut registry = self.registry.lock();
        if record.release() == 0 {
            trace!(record = record.name(), "record queued for pruning");
            registry.pruning.insert(record.name().to_string());
        }
    }

    /// Disposes every unreferenced record without outstanding writes.
    /// Returns how many were disposed.
    ///
    /// Records that still have pending or in-flight writes stay queued
    /// until those settle.
    ///
    /// # Errors
    ///
    /// Stops at the first [`ClientError::LifecycleInvariantViolation`].
    pub fn prune(&self) -> ClientResult<usize> {
        let disposed = {
            let mut registry = self.registry.lock();
            let candidates: Vec<String> = registry.pruning.iter().cloned().collect();
            let mut disposed = Vec::new();
            for name in candidates {
                let Some(record) = registry.records.get(&name).cloned() else {
                    registry.pruning.remove(&name);
                    continue;
                };
                if record.refs() > 0 {
                    registry.pruning.remove(&name);
                    continue;
                }
                if record.has_outstanding_writes() {
                    trace!(record = %name, "prune deferred for outstanding writes");
                    continue;
                }
                registry.pruning.remove(&name);
                registry.records.remove(&name);
                disposed.push(record);
            }
            disposed
        };

        let count = disposed.len();
        for record in disposed {
            record.dispose()?;
        }
        if count > 0 {
            debug!(count, "pruned records");
        }
        Ok(count)
    }

    /// Runs a prune sweep if `prune_interval` has passed since the last.
    pub fn tick(&self, now: Instant) {
        {
            let mut registry = self.registry.lock();
            let due = registry
                .last_prune
                .map_or(true, |last| now.saturating_duration_since(last) >= self.prune_interval);
            if !due {
                return;
            }
            registry.last_prune = Some(now);
        }
        if let Err(e) = self.prune() {
            error!(error = %e, "prune sweep aborted");
            self.context.sink.report_error(e);
        }
    }

    /// Looks up a live record without taking a reference.
    pub fn get(&self, name: &str) -> Option<Arc<Record>> {
        self.registry.lock().records.get(name).cloned()
    }

    /// Number of live records, pruning ones included.
    pub fn len(&self) -> usize {
        self.registry.lock().records.len()
    }

    /// Returns true if no record is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records waiting for the next sweep.
    pub fn pruning_len(&self) -> usize {
        self.registry.lock().pruning.len()
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
}

impl TopicHandler for RecordHandler {
    fn handle(&self, message: &Message) -> bool {
        let parsed = match RecordMessage::try_from(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "dropping malformed record message");
                self.context.sink.report_error(e.into());
                return true;
            }
        };
        let Some(name) = parsed.name() else {
            return false;
        };
        let Some(record) = self.get(name) else {
            debug!(record = name, action = ?message.action, "message for unknown record");
            return true;
        };
        record.handle(&parsed)
    }

    fn on_connection_change(&self, connected: bool) {
        let records: Vec<_> = self.registry.lock().records.values().cloned().collect();
        debug!(connected, records = records.len(), "connection changed");
        for record in records {
            record.on_connection_change(connected);
        }
    }
}

impl fmt::Debug for RecordHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("RecordHandler")
            .field("records", &registry.records.len())
            .field("pruning", &registry.pruning.len())
            .finish()
    }
}

/// A counted reference to a record.
///
/// Cloning takes another reference; dropping releases one.
pub struct RecordHandle {
    record: Arc<Record>,
    handler: Arc<RecordHandler>,
}

impl Deref for RecordHandle {
    type Target = Record;

    fn deref(&self) -> &Record {
        &self.record
    }
}

impl Clone for RecordHandle {
    fn clone(&self) -> Self {
        self.handler.retain(&self.record);
        Self {
            record: Arc::clone(&self.record),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl Drop for RecordHandle {
    fn drop(&mut self) {
        self.handler.release(&self.record);
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordHandle").field(&self.record).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::entry::tests::TestSink;
    use super::*;
    use recsync_codec::{Action, Topic, Value};

    fn handler(sink: &Arc<TestSink>, config: &ClientConfig) -> Arc<RecordHandler> {
        RecordHandler::new(Arc::clone(sink) as Arc<dyn MessageSink>, config)
    }

    fn inbound(action: Action, args: &[&str]) -> Message {
        Message::new(
            Topic::Record,
            action,
            args.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[test]
    fn acquire_subscribes_once() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());
        let a = records.acquire("x").unwrap();
        let b = records.acquire("x").unwrap();
        assert_eq!(a.refs(), 2);
        drop(b);
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Subscribe {
                name: "x".into(),
                version: None
            }]
        );
        assert!(records.acquire("").is_err());
    }

    #[test]
    fn release_defers_disposal_to_sweep() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());
        let a = records.acquire("x").unwrap();
        let b = records.acquire("x").unwrap();
        sink.take();

        drop(a);
        assert_eq!(records.pruning_len(), 0);
        drop(b);
        assert_eq!(records.pruning_len(), 1);
        assert_eq!(records.len(), 1);
        assert!(sink.take().is_empty());

        assert_eq!(records.prune().unwrap(), 1);
        assert_eq!(records.prune().unwrap(), 0);
        assert!(records.is_empty());
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Unsubscribe { name: "x".into() }]
        );
    }

    #[test]
    fn reacquire_rescues_a_pruning_record() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());
        drop(records.acquire("x").unwrap());
        let again = records.acquire("x").unwrap();
        assert_eq!(records.pruning_len(), 0);
        assert_eq!(records.prune().unwrap(), 0);
        assert_eq!(again.refs(), 1);
    }

    #[test]
    fn clone_takes_a_reference() {
        let sink = TestSink::new(false);
        let records = handler(&sink, &ClientConfig::default());
        let a = records.acquire("x").unwrap();
        let b = a.clone();
        assert_eq!(b.refs(), 2);
        drop(a);
        drop(b);
        assert_eq!(records.pruning_len(), 1);
    }

    #[test]
    fn prune_waits_for_outstanding_writes() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());
        let doc = records.acquire("doc").unwrap();
        assert!(records.handle(&inbound(Action::Update, &["doc", "1-a-s", "{}"])));
        doc.set(Some("a"), 1).unwrap();
        let version = doc.version().unwrap();
        drop(doc);
        sink.take();

        assert_eq!(records.prune().unwrap(), 0);
        assert_eq!(records.len(), 1);

        records.handle(&inbound(Action::Update, &["doc", version.as_str(), r#"{"a":1}"#]));
        assert_eq!(records.prune().unwrap(), 1);
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Unsubscribe { name: "doc".into() }]
        );
    }

    #[test]
    fn superseded_write_neither_blocks_pruning_nor_resends() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());
        let doc = records.acquire("doc").unwrap();
        records.handle(&inbound(Action::Update, &["doc", "1-a-s", "{}"]));
        doc.set(Some("a"), 1).unwrap();
        assert_eq!(doc.in_flight_writes(), 1);
        sink.take();

        records.handle(&inbound(Action::Update, &["doc", "3-zzz-other", r#"{"b":2}"#]));
        assert_eq!(doc.in_flight_writes(), 0);
        assert_eq!(doc.version().as_deref(), Some("3-zzz-other"));
        assert_eq!(doc.get(Some("b")), Some(Value::from(2)));

        records.on_connection_change(true);
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Subscribe {
                name: "doc".into(),
                version: Some("3-zzz-other".into())
            }]
        );

        drop(doc);
        assert_eq!(records.prune().unwrap(), 1);
        assert!(records.is_empty());
    }

    #[test]
    fn stale_versions_freeze_records_through_the_handler() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());

        let fresh = records.acquire("fresh").unwrap();
        records.handle(&inbound(Action::Read, &["fresh", "I-a-s", r#"{"x":1}"#]));
        assert_eq!(fresh.state(), RecordState::Stale);

        let doc = records.acquire("doc").unwrap();
        records.handle(&inbound(Action::Update, &["doc", "1-a-s", "{}"]));
        assert_eq!(doc.state(), RecordState::Server);
        records.handle(&inbound(Action::Update, &["doc", "I-b-s", r#"{"x":2}"#]));
        assert_eq!(doc.state(), RecordState::Stale);
        assert!(matches!(
            doc.set(Some("x"), 3),
            Err(ClientError::InvalidArgument(_))
        ));
        assert_eq!(doc.get(Some("x")), Some(Value::from(2)));
    }

    #[test]
    fn reconnect_replays_pending_writes_when_server_echoes_same_version() {
        let sink = TestSink::new(false);
        let cache = Arc::new(MemoryCache::new());
        cache.set("doc", &Value::from_json_str(r#"{"a":1}"#).unwrap(), "1-a-s");
        let records = handler(&sink, &ClientConfig::default().with_cache(cache));

        let doc = records.acquire("doc").unwrap();
        doc.set(Some("b"), 2).unwrap();
        assert_eq!(doc.pending_writes(), 1);

        sink.set_connected(true);
        records.on_connection_change(true);
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Subscribe {
                name: "doc".into(),
                version: Some("1-a-s".into())
            }]
        );

        records.handle(&inbound(Action::Read, &["doc", "1-a-s", r#"{"a":1}"#]));
        assert_eq!(doc.state(), RecordState::Server);
        assert_eq!(doc.pending_writes(), 0);
        assert_eq!(doc.in_flight_writes(), 1);

        let expected = Value::from_json_str(r#"{"a":1,"b":2}"#).unwrap();
        assert_eq!(doc.get(None), Some(expected.clone()));
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        let RecordMessage::Update { version, data, .. } = &sent[0] else {
            panic!("expected update, got {sent:?}");
        };
        assert!(version.starts_with("2-"));
        assert_eq!(data, &expected);

        let version = version.clone();
        records.handle(&inbound(Action::Update, &["doc", version.as_str(), r#"{"a":1,"b":2}"#]));
        assert_eq!(doc.in_flight_writes(), 0);
        assert!(sink.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_sweeps_on_interval() {
        let sink = TestSink::new(true);
        let config = ClientConfig::default().with_prune_interval(Duration::from_secs(1));
        let records = handler(&sink, &config);

        let start = Instant::now();
        records.tick(start);
        drop(records.acquire("x").unwrap());

        records.tick(start + Duration::from_millis(500));
        assert_eq!(records.len(), 1);
        records.tick(start + Duration::from_secs(1));
        assert!(records.is_empty());
    }

    #[test]
    fn cache_is_read_through_and_written_behind() {
        let sink = TestSink::new(true);
        let cache = Arc::new(MemoryCache::new());
        cache.set("doc", &Value::from_json_str(r#"{"a":1}"#).unwrap(), "1-a-s");
        let config = ClientConfig::default().with_cache(cache.clone());
        let records = handler(&sink, &config);

        let doc = records.acquire("doc").unwrap();
        assert_eq!(doc.state(), RecordState::Client);
        assert_eq!(doc.get(Some("a")), Some(Value::from(1)));
        assert_eq!(
            sink.take(),
            vec![RecordMessage::Subscribe {
                name: "doc".into(),
                version: Some("1-a-s".into())
            }]
        );

        records.handle(&inbound(Action::Update, &["doc", "2-b-s", r#"{"a":2}"#]));
        assert_eq!(cache.get("doc").unwrap().1, "2-b-s");
    }

    #[test]
    fn routes_by_name_and_reports_parse_errors() {
        let sink = TestSink::new(true);
        let records = handler(&sink, &ClientConfig::default());
        let doc = records.acquire("doc").unwrap();

        assert!(records.handle(&inbound(Action::Read, &["doc", "1-a-s", r#"{"k":true}"#])));
        assert_eq!(doc.state(), RecordState::Server);
        assert!(records.handle(&inbound(Action::Update, &["other", "1-a-s", "{}"])));

        assert!(records.handle(&inbound(Action::Update, &["doc", "2-a-s", "{not json"])));
        assert_eq!(sink.errors.lock().len(), 1);

        assert!(!records.handle(&inbound(Action::Listen, &["pattern.*"])));
    }

    #[test]
    fn connection_changes_reach_every_record() {
        let sink = TestSink::new(false);
        let records = handler(&sink, &ClientConfig::default());
        let _a = records.acquire("a").unwrap();
        let _b = records.acquire("b").unwrap();
        assert!(sink.take().is_empty());

        sink.set_connected(true);
        records.on_connection_change(true);
        let mut names: Vec<_> = sink
            .take()
            .into_iter()
            .filter_map(|m| m.name().map(str::to_string))
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
