//! Record cache seam.

use parking_lot::RwLock;
use recsync_codec::Value;
use std::collections::HashMap;

/// A read-through/write-behind store for record snapshots.
///
/// The cache only saves round trips. A record created from a cached
/// snapshot still subscribes and still waits for the server before it
/// reaches [`RecordState::Server`](super::RecordState::Server).
pub trait RecordCache: Send + Sync {
    /// Looks up the last stored snapshot of `name`.
    fn get(&self, name: &str) -> Option<(Value, String)>;

    /// Stores an authoritative snapshot.
    fn set(&self, name: &str, data: &Value, version: &str);
}

/// An in-memory [`RecordCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Value, String)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl RecordCache for MemoryCache {
    fn get(&self, name: &str) -> Option<(Value, String)> {
        self.entries.read().get(name).cloned()
    }

    fn set(&self, name: &str, data: &Value, version: &str) {
        self.entries
            .write()
            .insert(name.to_string(), (data.clone(), version.to_string()));
    }
}
