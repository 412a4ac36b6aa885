//! Transport layer abstraction.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use parking_lot::Mutex;
use recsync_codec::{decode_frames, Message};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A duplex byte transport.
///
/// This trait abstracts the socket, allowing for different implementations
/// (WebSocket, TCP, in-memory for testing). It only carries outbound calls;
/// the host reports inbound events by calling the connection's
/// `handle_open`, `handle_message`, `handle_error` and `handle_close`.
pub trait Transport: Send + Sync {
    /// Starts connecting to `url`. Completion is reported through
    /// `handle_open` or `handle_close`.
    fn open(&self, url: &str) -> ClientResult<()>;

    /// Writes one chunk, which may hold several frames.
    fn send(&self, chunk: Bytes) -> ClientResult<()>;

    /// Closes the transport. The host reports `handle_close` afterwards.
    fn close(&self);
}

/// A transport that records every call, for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    opened: Mutex<Vec<String>>,
    sent: Mutex<Vec<Bytes>>,
    closes: AtomicUsize,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `open` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `send` calls fail.
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// URLs passed to `open`, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Raw chunks passed to `send`, in order.
    pub fn sent_chunks(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Decodes every chunk sent so far into messages.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .flat_map(|chunk| decode_frames(chunk))
            .filter_map(Result::ok)
            .collect()
    }

    /// Decodes and forgets every chunk sent so far.
    pub fn take_sent(&self) -> Vec<Message> {
        let chunks = std::mem::take(&mut *self.sent.lock());
        chunks
            .iter()
            .flat_map(|chunk| decode_frames(chunk))
            .filter_map(Result::ok)
            .collect()
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &str) -> ClientResult<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ClientError::transport_retryable(format!(
                "cannot reach {url}"
            )));
        }
        self.opened.lock().push(url.to_string());
        Ok(())
    }

    fn send(&self, chunk: Bytes) -> ClientResult<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ClientError::transport_retryable("send failed"));
        }
        self.sent.lock().push(chunk);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_codec::{to_frame, Action, Topic};

    #[test]
    fn mock_transport_records_calls() {
        let transport = MockTransport::new();
        transport.open("ws://localhost").unwrap();
        transport.close();

        assert_eq!(transport.opened(), vec!["ws://localhost".to_string()]);
        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn mock_transport_open_failure() {
        let transport = MockTransport::new();
        transport.set_fail_open(true);

        let result = transport.open("ws://localhost");
        assert!(matches!(result, Err(ClientError::Transport { retryable: true, .. })));
        assert!(transport.opened().is_empty());
    }

    #[test]
    fn mock_transport_decodes_sent_chunks() {
        let transport = MockTransport::new();
        let ping = Message::bare(Topic::Connection, Action::Ping);
        let pong = Message::bare(Topic::Connection, Action::Pong);
        let mut chunk = to_frame(&ping).unwrap().to_vec();
        chunk.extend_from_slice(&to_frame(&pong).unwrap());
        transport.send(Bytes::from(chunk)).unwrap();

        assert_eq!(transport.sent_chunks().len(), 1);
        assert_eq!(transport.take_sent(), vec![ping, pong]);
        assert!(transport.sent_messages().is_empty());
    }
}
