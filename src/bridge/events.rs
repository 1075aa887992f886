//! Change notifications.
//!
//! Every mutation of the bridge's observable state produces one or more
//! [`BridgeEvent`]s. They are queued in mutation order while the bridge lock
//! is still held, then delivered after it is released, so a listener may read
//! from (or call into) the bridge.
//!
//! Only one thread delivers at a time. A mutation that finds delivery already
//! running leaves its events to that thread, which keeps every listener's view
//! in the same order as the mutations themselves.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};

use crate::identifiers::ListenerId;

use super::manager::ConnectionState;

// ============================================================================
// BridgeEvent
// ============================================================================

/// Something observable changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Connection state moved.
    StatusChanged(ConnectionState),
    /// Topic catalog replaced by a board snapshot.
    TopicsReplaced,
    /// One catalog entry added or changed by a data message.
    TopicTypeUpdated {
        /// Topic whose type changed.
        topic: String,
    },
    /// New sample cached for a topic.
    MessageUpdated {
        /// Topic of the sample.
        topic: String,
    },
    /// Topic removed from the caches.
    MessageEvicted {
        /// Topic that was evicted.
        topic: String,
    },
    /// Message cache emptied.
    MessagesCleared,
    /// Board system information replaced.
    SystemInfoUpdated,
    /// Last-error string set.
    ErrorRecorded(String),
}

// ============================================================================
// ChangeListener
// ============================================================================

/// Listener callback type.
pub type ChangeListener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

/// Registered listeners, in registration order.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<(ListenerId, ChangeListener)>>,
}

impl ListenerSet {
    /// Registers a listener.
    pub(crate) fn add(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers `events` to every listener.
    ///
    /// The listener list is snapshotted first, so listeners may register or
    /// remove listeners while being notified.
    pub(crate) fn notify(&self, events: &[BridgeEvent]) {
        if events.is_empty() {
            return;
        }
        let snapshot: Vec<ChangeListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for event in events {
            for listener in &snapshot {
                listener(event);
            }
        }
    }
}

// ============================================================================
// EventQueue
// ============================================================================

#[derive(Default)]
struct QueueState {
    pending: VecDeque<BridgeEvent>,
    /// Set while one thread is delivering.
    draining: bool,
}

/// Events waiting for delivery, in mutation order.
#[derive(Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
}

impl EventQueue {
    /// Appends the events of one mutation.
    ///
    /// Must be called while the mutation's lock is still held.
    pub(crate) fn push(&self, events: Vec<BridgeEvent>) {
        if !events.is_empty() {
            self.state.lock().pending.extend(events);
        }
    }

    /// Delivers pending events, unless another caller (or an outer frame of
    /// this one) is already delivering them.
    pub(crate) fn drain(&self, listeners: &ListenerSet) {
        {
            let mut state = self.state.lock();
            if state.draining || state.pending.is_empty() {
                return;
            }
            state.draining = true;
        }
        let _unwind = DrainGuard(self);

        loop {
            let batch: Vec<BridgeEvent> = {
                let mut state = self.state.lock();
                if state.pending.is_empty() {
                    state.draining = false;
                    return;
                }
                state.pending.drain(..).collect()
            };
            listeners.notify(&batch);
        }
    }
}

/// Releases the drain flag when a listener panics.
struct DrainGuard<'a>(&'a EventQueue);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.state.lock().draining = false;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
