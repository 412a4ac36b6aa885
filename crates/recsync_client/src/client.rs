//! Client facade.

use crate::config::ClientConfig;
use crate::connection::{
    Connection, ConnectionEvent, ConnectionState, MessageSink, TopicHandler,
};
use crate::emitter::ListenerId;
use crate::error::{ClientError, ClientResult};
use crate::record::{RecordHandle, RecordHandler};
use crate::transport::Transport;
use recsync_codec::{Topic, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A connection to one server plus the records synchronized over it.
///
/// ```no_run
/// use recsync_client::{Client, ClientConfig, MockTransport};
/// use std::sync::Arc;
///
/// # async fn demo() -> recsync_client::ClientResult<()> {
/// let client = Client::new("ws://localhost:6020", ClientConfig::default(), Arc::new(MockTransport::new()));
/// client.connect();
/// let _timers = client.spawn_timers();
///
/// let doc = client.record("users/ada")?;
/// doc.set(Some("name"), "Ada")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    connection: Arc<Connection>,
    records: Arc<RecordHandler>,
}

impl Client {
    /// Creates a client for `url`. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(
        url: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let connection = Connection::new(url, config.clone(), transport);
        let records = RecordHandler::new(Arc::clone(&connection) as Arc<dyn MessageSink>, &config);
        let handler: Arc<dyn TopicHandler> = records.clone();
        connection.register_handler(Topic::Record, &handler);
        info!(url = %connection.url(), "client created");
        Self {
            connection,
            records,
        }
    }

    /// The underlying connection, for feeding transport events.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The record registry.
    pub fn records(&self) -> &Arc<RecordHandler> {
        &self.records
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Starts connecting.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Authenticates with `params`.
    ///
    /// The request is registered immediately; the returned future resolves
    /// with the server-supplied identity once the server answers.
    ///
    /// # Errors
    ///
    /// Resolves to [`ClientError::AuthFailed`] when the server rejects the
    /// credentials, to a terminal error when the connection gives up, and
    /// to [`ClientError::Cancelled`] when a newer login or a close
    /// supersedes this one.
    pub fn login(
        &self,
        params: Value,
    ) -> impl Future<Output = ClientResult<Option<Value>>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let started = self.connection.login(
            params,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        async move {
            started?;
            rx.await.unwrap_or(Err(ClientError::Cancelled))
        }
    }

    /// Takes a reference to the record `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::InvalidArgument`] for an empty name.
    pub fn record(&self, name: &str) -> ClientResult<RecordHandle> {
        self.records.acquire(name)
    }

    /// Registers a callback for connection events.
    pub fn on_event<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection.on_event(callback)
    }

    /// Removes an event callback.
    pub fn off_event(&self, id: ListenerId) -> bool {
        self.connection.off_event(id)
    }

    /// Advances reconnect, heartbeat and prune timers to `now`.
    pub fn tick(&self, now: Instant) {
        self.connection.tick(now);
        self.records.tick(now);
    }

    /// Drives [`tick`](Self::tick) from a tokio interval every
    /// `tick_interval`.
    ///
    /// The task holds weak references and ends once the client is dropped.
    pub fn spawn_timers(&self) -> JoinHandle<()> {
        let connection = Arc::downgrade(&self.connection);
        let records = Arc::downgrade(&self.records);
        let period = self
            .connection
            .config()
            .tick_interval
            .max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let now = interval.tick().await;
                let (Some(connection), Some(records)) = (connection.upgrade(), records.upgrade())
                else {
                    break;
                };
                connection.tick(now);
                records.tick(now);
            }
            debug!("timer task stopped");
        })
    }

    /// Closes the connection. No reconnect follows.
    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use recsync_codec::{to_frame, Action, Message};
    use recsync_protocol::RecordMessage;
    use serde_json::json;

    fn deliver(client: &Client, topic: Topic, action: Action, args: &[&str]) {
        let message = Message::new(topic, action, args.iter().map(|a| a.to_string()).collect());
        client
            .connection()
            .handle_message(to_frame(&message).unwrap());
    }

    fn open_client() -> (Client, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = Client::new("ws://server", ClientConfig::default(), transport.clone());
        client.connect();
        client.connection().handle_open();
        deliver(&client, Topic::Connection, Action::Ack, &[]);
        (client, transport)
    }

    #[tokio::test]
    async fn login_resolves_with_identity() {
        let (client, _) = open_client();
        let login = client.login(Value::from(json!({"token": "t"})));
        deliver(&client, Topic::Auth, Action::Ack, &["O{\"id\":7}"]);
        assert_eq!(
            login.await,
            Ok(Some(Value::from_json_str(r#"{"id":7}"#).unwrap()))
        );
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn superseded_login_is_cancelled() {
        let (client, _) = open_client();
        let first = client.login(Value::Null);
        let second = client.login(Value::Null);
        assert_eq!(first.await, Err(ClientError::Cancelled));
        client.close();
        assert_eq!(second.await, Err(ClientError::Cancelled));
    }

    #[tokio::test]
    async fn records_subscribe_when_connection_opens() {
        let (client, transport) = open_client();
        let doc = client.record("doc").unwrap();
        assert!(transport.take_sent().is_empty());

        let login = client.login(Value::Null);
        deliver(&client, Topic::Auth, Action::Ack, &[]);
        login.await.unwrap();

        let sent: Vec<_> = transport
            .take_sent()
            .iter()
            .filter(|m| m.topic == Topic::Record)
            .map(|m| RecordMessage::try_from(m).unwrap())
            .collect();
        assert_eq!(
            sent,
            vec![RecordMessage::Subscribe {
                name: "doc".into(),
                version: None
            }]
        );

        deliver(&client, Topic::Record, Action::Read, &["doc", "1-a-s", r#"{"n":1}"#]);
        assert_eq!(doc.get(Some("n")), Some(Value::from(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_stop_when_client_is_dropped() {
        let transport = Arc::new(MockTransport::new());
        let client = Client::new("ws://server", ClientConfig::default(), transport);
        let timers = client.spawn_timers();
        tokio::time::advance(Duration::from_millis(250)).await;
        drop(client);
        tokio::time::advance(Duration::from_millis(250)).await;
        timers.await.unwrap();
    }

    #[test]
    fn tick_prunes_released_records() {
        let transport = Arc::new(MockTransport::new());
        let client = Client::new("ws://server", ClientConfig::default(), transport);
        drop(client.record("doc").unwrap());
        assert_eq!(client.records().len(), 1);
        client.tick(Instant::now());
        assert!(client.records().is_empty());
    }
}
