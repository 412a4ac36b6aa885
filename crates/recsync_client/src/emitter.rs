//! Copy-on-write listener lists.
//!
//! `emit` snapshots the list and runs callbacks with no lock held, so a
//! callback may subscribe or unsubscribe (itself included) without
//! disturbing the pass in progress. Changes apply from the next emission.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of callbacks receiving `&T`.
pub struct Listeners<T> {
    inner: Mutex<ListenerList<T>>,
}

struct ListenerList<T> {
    next_id: u64,
    entries: Arc<Vec<(ListenerId, Callback<T>)>>,
}

impl<T> Listeners<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ListenerList {
                next_id: 0,
                entries: Arc::new(Vec::new()),
            }),
        }
    }

    /// Appends a callback.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        Arc::make_mut(&mut inner.entries).push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.entries.iter().position(|(i, _)| *i == id) else {
            return false;
        };
        Arc::make_mut(&mut inner.entries).remove(pos);
        true
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every callback registered when the pass starts.
    pub fn emit(&self, value: &T) {
        let snapshot = Arc::clone(&self.inner.lock().entries);
        for (_, callback) in snapshot.iter() {
            callback(value);
        }
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
