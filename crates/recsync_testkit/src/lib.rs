//! # recsync testkit
//!
//! Test utilities for recsync.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - Golden wire vectors for cross-implementation checks
//! - Fuzz harnesses for the frame and typed-value decoders
//! - Hex helpers for frame assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use recsync_testkit::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn json_roundtrips(value in value_strategy()) {
//!         let text = value.to_json_string().unwrap();
//!         prop_assert_eq!(recsync_codec::Value::from_json_str(&text).unwrap(), value);
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fuzz;
pub mod generators;
pub mod golden;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::golden::*;
    pub use crate::vectors::*;
}

pub use fuzz::*;
pub use generators::*;
pub use golden::*;
pub use vectors::*;
