//! Listener fan-out for gateway events.
//!
//! Listeners are plain callbacks invoked synchronously, in registration
//! order, once per inbound event. Dispatch iterates over a snapshot of the
//! set, so a listener removed mid-pass still finishes the current pass but
//! is absent from the next. Each invocation runs under `catch_unwind` so a
//! panicking subscriber cannot block fan-out to the rest.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::events::EventEnvelope;

#[derive(Clone)]
struct Entry {
    id: u64,
    callback: Arc<dyn Fn(&EventEnvelope) + Send + Sync>,
}

struct Inner {
    listeners: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

/// Registry of event listeners. Cheap to clone; all clones share one set.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener. Dropping the returned guard (or calling
    /// [`ListenerGuard::cancel`]) removes it.
    pub fn add(
        &self,
        callback: impl Fn(&EventEnvelope) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push(Entry {
            id,
            callback: Arc::new(callback),
        });
        ListenerGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Remove a listener by id. Unknown or already-removed ids are ignored.
    pub fn remove(&self, id: u64) {
        self.inner.listeners.lock().retain(|e| e.id != id);
    }

    /// Drop every registered listener.
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one event to every currently-registered listener, in
    /// registration order.
    pub fn dispatch(&self, envelope: &EventEnvelope) {
        // Snapshot outside the lock so listeners can (de)register themselves
        // during their own invocation.
        let snapshot: Vec<Entry> = self.inner.listeners.lock().clone();
        for entry in snapshot {
            let callback = entry.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(envelope))).is_err() {
                tracing::warn!(
                    listener_id = entry.id,
                    kind = %envelope.kind,
                    "listener panicked during dispatch"
                );
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// De-registration handle for a listener. Removal is idempotent and safe
/// even after the registry cleared its set or was dropped entirely.
pub struct ListenerGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl ListenerGuard {
    /// Remove the listener now instead of on drop.
    pub fn cancel(self) {}

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.lock().retain(|e| e.id != self.id);
        }
    }
}
