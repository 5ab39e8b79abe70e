//! Unread counts and the in-memory notification list.
//!
//! The aggregator owns both; UI code reads snapshots and routes every
//! mutation (mark-as-read, eviction) through here. The unread count is
//! seeded from the backend's authoritative value on each connect, which
//! also reconciles any drift caused by missed events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::gateway::events::NotificationPayload;

/// Maximum number of notifications retained in memory. Oldest entries are
/// evicted once the list is full.
const MAX_NOTIFICATIONS: usize = 200;

/// A single user-facing notification, newest-first in the list.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub kind: String,
    pub payload: Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

struct State {
    items: VecDeque<Notification>,
    unread: u64,
}

/// Aggregates the event stream into unread state.
pub struct NotificationCenter {
    state: Mutex<State>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                unread: 0,
            }),
        }
    }

    /// Seed the unread count from the backend's authoritative value.
    pub fn seed_unread(&self, count: u64) {
        self.state.lock().unread = count;
    }

    /// Record an inbound `notification` event.
    ///
    /// Prepends one entry and bumps the unread count. Duplicate ids are
    /// dropped: the backend pairs `new_message` with a `notification` event,
    /// and a re-delivered pair must not double-count.
    pub fn push(&self, payload: NotificationPayload) -> bool {
        let mut state = self.state.lock();
        if state.items.iter().any(|n| n.id == payload.id) {
            tracing::debug!(id = %payload.id, "duplicate notification dropped");
            return false;
        }
        state.items.push_front(Notification {
            id: payload.id,
            kind: payload.kind,
            payload: payload.payload,
            read: false,
            created_at: Utc::now(),
        });
        while state.items.len() > MAX_NOTIFICATIONS {
            state.items.pop_back();
        }
        state.unread += 1;
        true
    }

    /// Flip the matching entry to read and decrement the unread count,
    /// floored at zero. Unknown or already-read ids change nothing.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.items.iter_mut().find(|n| n.id == id) else {
            tracing::debug!(id, "notification_read for unknown notification");
            return false;
        };
        if entry.read {
            return false;
        }
        entry.read = true;
        state.unread = state.unread.saturating_sub(1);
        true
    }

    /// Mark everything read and zero the unread count.
    pub fn mark_all_read(&self) {
        let mut state = self.state.lock();
        for entry in state.items.iter_mut() {
            entry.read = true;
        }
        state.unread = 0;
    }

    pub fn unread_count(&self) -> u64 {
        self.state.lock().unread
    }

    /// Newest-first copy of the notification list.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.state.lock().items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
