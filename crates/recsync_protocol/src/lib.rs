//! # recsync protocol
//!
//! Pure protocol logic for record synchronization.
//!
//! This crate provides:
//! - [`version`]: parsing, ordering and generation of record version tokens
//! - [`path`]: tokenized path accessors
//! - [`patch`]: structural get/set/merge with subtree sharing
//! - [`messages`]: typed views over connection, auth and record frames
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod messages;
pub mod patch;
pub mod path;
pub mod version;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{reason, AuthMessage, ConnectionMessage, RecordMessage};
pub use patch::{get, merge, set};
pub use version::{compare, is_same_or_newer, is_stale, Sequence};
