//! # recsync client
//!
//! Client engine for the recsync record synchronization protocol.
//!
//! This crate provides:
//! - A sans-IO connection state machine (handshake, authentication,
//!   heartbeat, reconnect with linear backoff, redirects)
//! - Inbound draining and outbound batching through a pluggable scheduler
//! - Reference-counted records with optimistic writes and replay
//! - A cache seam for read-through/write-behind persistence
//!
//! ## Architecture
//!
//! The host owns the socket. It implements [`Transport`] for outbound calls
//! and reports inbound events to the [`Connection`] through `handle_open`,
//! `handle_message`, `handle_error` and `handle_close`. Time advances
//! through [`Client::tick`], either called by the host or driven by
//! [`Client::spawn_timers`].
//!
//! ## Key Invariants
//!
//! - The server is authoritative; local writes are optimistic
//! - A record version always moves together with its data
//! - A record state only rises while connected and drops to `CLIENT` on
//!   disconnect
//! - A record is never disposed while referenced or while it has
//!   unconfirmed writes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod client;
mod config;
mod connection;
mod emitter;
mod error;
mod record;
mod scheduler;
mod transport;

pub use cancel::CancellationToken;
pub use client::Client;
pub use config::{ClientConfig, ReconnectConfig};
pub use connection::{
    AuthCallback, Connection, ConnectionEvent, ConnectionState, ConnectionStats, MessageSink,
    TopicHandler,
};
pub use emitter::{ListenerId, Listeners};
pub use error::{ClientError, ClientResult};
pub use record::{
    MemoryCache, Record, RecordCache, RecordHandle, RecordHandler, RecordSnapshot, RecordState,
    UpdateOptions, WaitOptions,
};
pub use scheduler::{ImmediateScheduler, ManualScheduler, Scheduler, Task, TokioScheduler};
pub use transport::{MockTransport, Transport};
