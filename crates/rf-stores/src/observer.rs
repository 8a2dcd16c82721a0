//! # Observer registry
//!
//! Explicit publish-subscribe in place of reactive auto-tracking: a store
//! notifies every registered callback once per committed mutation batch,
//! after its state lock is released. Callbacks read whatever derived state
//! they need through the store's accessors and keep their own last-seen
//! snapshot to detect edges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `subscribe`; pass it back to `unsubscribe` to detach.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

/// Callback registry shared by all stores.
#[derive(Default)]
pub struct Subscribers {
    entries: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Callback)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, Arc::new(callback)));
        Subscription { id }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.entries().retain(|(id, _)| *id != subscription.id);
    }

    /// Invokes every callback. The registry lock is not held during the
    /// calls, so a callback may subscribe or unsubscribe reentrantly.
    pub fn notify(&self) {
        let snapshot: Vec<Callback> = self
            .entries()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback();
        }
    }
}
