//! The [`Bridge`] context object.
//!
//! One `Bridge` owns one Connection Manager, one Subscription Registry and
//! one Message Router behind a single lock. Every public operation runs to
//! completion under that lock and queues the [`BridgeEvent`]s it caused;
//! listeners are notified in that order after the lock is released.
//!
//! # Example
//!
//! ```no_run
//! use rosboard_bridge::{Bridge, SubscribeOptions};
//!
//! # async fn example() -> rosboard_bridge::Result<()> {
//! let bridge = Bridge::builder().host("10.0.0.5").port(9999).build()?;
//!
//! bridge.on_change(|event| println!("{event:?}"));
//! bridge.subscribe("/imu", SubscribeOptions::with_rate(10.0));
//!
//! // ...later
//! if let Some(sample) = bridge.latest("/imu") {
//!     println!("{}", sample.to_value());
//! }
//! bridge.unsubscribe("/imu");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};
use url::Url;

use crate::identifiers::{ConnectionId, ListenerId};
use crate::protocol::{Frame, TopicMessage, decode};
use crate::transport::{Connector, SocketEvent, SocketListener};

use super::builder::BridgeBuilder;
use super::events::{BridgeEvent, EventQueue, ListenerSet};
use super::manager::{ConnectionManager, ConnectionState, RetryPlan};
use super::options::{BridgeOptions, Endpoint};
use super::registry::{Released, Subscription, SubscriptionRegistry};
use super::router::MessageRouter;

// ============================================================================
// SubscribeOptions
// ============================================================================

/// Per-call subscription options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubscribeOptions {
    /// Maximum messages per second. `None` (or a non-positive value) keeps
    /// the topic's current rate, or the default for a new topic.
    pub max_update_rate: Option<f64>,
}

impl SubscribeOptions {
    /// Requests a specific update rate.
    #[inline]
    #[must_use]
    pub const fn with_rate(rate: f64) -> Self {
        Self {
            max_update_rate: Some(rate),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// Everything guarded by the bridge lock.
struct BridgeState {
    manager: ConnectionManager,
    registry: SubscriptionRegistry,
    router: MessageRouter,
    default_update_rate: f64,
}

/// Internal shared state of a bridge.
pub(crate) struct BridgeInner {
    state: Mutex<BridgeState>,
    listeners: ListenerSet,
    /// Events not yet delivered to listeners.
    pending: EventQueue,
    /// Self reference handed to reconnect timers.
    this: Weak<BridgeInner>,
}

// ============================================================================
// Bridge
// ============================================================================

/// Reference-counted pub/sub client for one ROSboard.
///
/// Cheap to clone; every clone drives the same socket and caches.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Bridge")
            .field("endpoint", state.manager.endpoint())
            .field("status", &state.manager.status())
            .field("active_topics", &state.registry.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Bridge - Construction
// ============================================================================

impl Bridge {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Creates a bridge from validated parts.
    pub(crate) fn from_parts(
        endpoint: Endpoint,
        options: &BridgeOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<BridgeInner>| {
            let listener: Weak<dyn SocketListener> = this.clone();
            BridgeInner {
                state: Mutex::new(BridgeState {
                    manager: ConnectionManager::new(endpoint, options, connector, listener),
                    registry: SubscriptionRegistry::default(),
                    router: MessageRouter::default(),
                    default_update_rate: options.default_update_rate,
                }),
                listeners: ListenerSet::default(),
                pending: EventQueue::default(),
                this: this.clone(),
            }
        });
        Self { inner }
    }

    /// Runs `op` under the lock, then notifies listeners of what it caused.
    fn mutate<R>(&self, op: impl FnOnce(&mut BridgeState, &mut Vec<BridgeEvent>) -> R) -> R {
        self.inner.mutate(op)
    }
}

// ============================================================================
// Bridge - Connection
// ============================================================================

impl Bridge {
    /// Sets host and/or port. `None` leaves a part unchanged.
    ///
    /// Takes effect on the next connect; an existing socket is kept.
    pub fn configure(&self, host: Option<&str>, port: Option<u16>) {
        self.mutate(|state, _| state.manager.configure(host, port));
    }

    /// Opens a socket unless one is already connecting or open.
    ///
    /// With no host configured, the state becomes `Error` and the reason is
    /// recorded as the last error.
    pub fn connect(&self) {
        self.mutate(|state, events| {
            state.manager.connect(events);
        });
    }

    /// Closes the socket without triggering a reconnect.
    ///
    /// Subscriptions are kept and resent on the next connect. With
    /// `clear_config`, the endpoint is reset to unconfigured.
    pub fn disconnect(&self, clear_config: bool) {
        self.mutate(|state, events| state.disconnect(clear_config, events));
    }

    /// Connects if configured and no usable socket exists.
    pub fn ensure_connected(&self) {
        self.mutate(|state, events| {
            if !state.manager.endpoint().is_configured() {
                state.manager.record_unconfigured(events);
                return;
            }
            if state.manager.needs_socket() {
                state.manager.connect(events);
            }
        });
    }

    /// Disconnects when the idle policy is on and nothing is subscribed.
    pub fn disconnect_if_idle(&self) {
        self.mutate(|state, events| state.disconnect_if_idle(events));
    }

    /// Changes the idle policy and applies it immediately.
    pub fn set_disconnect_when_idle(&self, disconnect: bool) {
        self.mutate(|state, events| {
            state.manager.set_disconnect_when_idle(disconnect);
            if disconnect && state.registry.is_empty() {
                state.disconnect(false, events);
            } else if !disconnect && !state.registry.is_empty() {
                state.manager.connect(events);
            }
        });
    }
}

// ============================================================================
// Bridge - Subscriptions
// ============================================================================

impl Bridge {
    /// Adds one holder to `topic`, connecting if needed.
    ///
    /// The name is trimmed; an empty name is ignored. A SUB frame goes out
    /// when the socket is open and the topic is not yet subscribed on it, or
    /// the requested rate differs from the stored one.
    pub fn subscribe(&self, topic: &str, options: SubscribeOptions) {
        let topic = topic.trim();
        if topic.is_empty() {
            return;
        }

        self.mutate(|state, events| {
            let acquired =
                state
                    .registry
                    .acquire(topic, options.max_update_rate, state.default_update_rate);
            debug!(
                topic,
                refcount = acquired.refcount,
                rate = acquired.rate,
                "Subscribed"
            );

            // A socket whose open event is still in flight counts as
            // connecting: the resync on open sends this topic.
            if state.manager.needs_socket() {
                state.manager.connect(events);
            } else if state.manager.is_connected()
                && (acquired.rate_changed || !state.registry.is_sent(topic))
            {
                state.send_subscribe(topic, acquired.rate, events);
            }
        });
    }

    /// Removes one holder from `topic`.
    ///
    /// When the last holder leaves, the topic is unsubscribed on the wire,
    /// evicted from the caches, and (with the idle policy on) the socket is
    /// closed once nothing else is subscribed.
    pub fn unsubscribe(&self, topic: &str) {
        let topic = topic.trim();
        if topic.is_empty() {
            return;
        }

        self.mutate(|state, events| match state.registry.release(topic) {
            Released::Unknown => {}
            Released::Retained(refcount) => debug!(topic, refcount, "Unsubscribed"),
            Released::Removed { was_sent } => {
                debug!(topic, "Last holder left");
                if was_sent {
                    state.manager.send(&Frame::unsubscribe(topic), events);
                }
                state.router.forget_topic(topic, events);
                state.disconnect_if_idle(events);
            }
        });
    }

    /// Unsubscribes every sent topic and empties registry and message cache.
    pub fn clear_all_subscriptions(&self) {
        self.mutate(|state, events| {
            for topic in state.registry.sent_topics() {
                state.manager.send(&Frame::unsubscribe(topic), events);
            }
            state.registry.clear();
            state.router.clear_messages(events);
            debug!("All subscriptions cleared");
        });
    }
}

// ============================================================================
// Bridge - Reads
// ============================================================================

impl Bridge {
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.state.lock().manager.status()
    }

    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionState::Connected
    }

    #[inline]
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.state.lock().manager.endpoint().is_configured()
    }

    /// Most recent error text.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().manager.last_error().map(str::to_owned)
    }

    /// WebSocket URL of the board, `None` while unconfigured.
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.inner.state.lock().manager.url()
    }

    /// `host:port`, `None` while unconfigured.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        self.inner.state.lock().manager.endpoint().address()
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.inner.state.lock().manager.endpoint().clone()
    }

    #[inline]
    #[must_use]
    pub fn disconnect_when_idle(&self) -> bool {
        self.inner.state.lock().manager.disconnect_when_idle()
    }

    /// Number of topics with at least one holder.
    #[inline]
    #[must_use]
    pub fn active_topic_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Holders of `topic`; zero when not subscribed.
    #[must_use]
    pub fn refcount(&self, topic: &str) -> u32 {
        self.inner.state.lock().registry.refcount(topic.trim())
    }

    #[must_use]
    pub fn subscription(&self, topic: &str) -> Option<Subscription> {
        self.inner.state.lock().registry.get(topic.trim()).cloned()
    }

    /// Returns `true` when a SUB for `topic` went out on the current socket.
    #[must_use]
    pub fn is_subscribed_on_wire(&self, topic: &str) -> bool {
        self.inner.state.lock().registry.is_sent(topic.trim())
    }

    /// Snapshot of the topic catalog, name to type.
    #[must_use]
    pub fn topics(&self) -> BTreeMap<String, String> {
        self.inner.state.lock().router.cache().topics().clone()
    }

    #[must_use]
    pub fn topic_type(&self, topic: &str) -> Option<String> {
        self.inner
            .state
            .lock()
            .router
            .cache()
            .topic_type(topic)
            .map(str::to_owned)
    }

    /// Latest sample of `topic`.
    #[must_use]
    pub fn latest(&self, topic: &str) -> Option<TopicMessage> {
        self.inner.state.lock().router.cache().latest(topic).cloned()
    }

    #[must_use]
    pub fn system_info(&self) -> Option<Value> {
        self.inner.state.lock().router.cache().system_info().cloned()
    }

    /// Distinct first path segments of catalog topics, sorted.
    #[must_use]
    pub fn nodes(&self) -> Vec<String> {
        self.inner.state.lock().router.cache().nodes()
    }
}

// ============================================================================
// Bridge - Change Notification
// ============================================================================

impl Bridge {
    /// Registers a change listener.
    ///
    /// Listeners run after each mutation, outside the bridge lock, and may
    /// call back into the bridge. Events arrive in mutation order; when
    /// another thread is already delivering, that thread delivers these too.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

// ============================================================================
// BridgeState
// ============================================================================

impl BridgeState {
    fn send_subscribe(&mut self, topic: &str, rate: f64, events: &mut Vec<BridgeEvent>) {
        if self.manager.send(&Frame::subscribe(topic, rate), events) {
            self.registry.mark_sent(topic);
        }
    }

    /// Sends SUB for every registered topic. Runs on every open.
    fn resync(&mut self, events: &mut Vec<BridgeEvent>) {
        let entries = self.registry.entries();
        debug!(topics = entries.len(), "Resyncing subscriptions");
        for (topic, rate) in entries {
            self.send_subscribe(&topic, rate, events);
        }
    }

    fn disconnect(&mut self, clear_config: bool, events: &mut Vec<BridgeEvent>) {
        self.manager.disconnect(clear_config, events);
        self.registry.clear_sent();
    }

    fn disconnect_if_idle(&mut self, events: &mut Vec<BridgeEvent>) {
        if self.manager.disconnect_when_idle() && self.registry.is_empty() {
            self.disconnect(false, events);
        }
    }

    /// Decodes and dispatches one inbound text frame.
    fn route(&mut self, raw: &str, events: &mut Vec<BridgeEvent>) {
        let frame = match decode(raw) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                trace!("Discarding frame with unexpected shape");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Dropping undecodable frame");
                self.manager.record_error(err.to_string(), events);
                return;
            }
        };

        trace!(tag = frame.tag(), "Frame received");
        let routed = self
            .router
            .dispatch(frame, Utc::now().timestamp_millis(), events);

        if let Some(reply) = routed.reply {
            self.manager.send(&reply, events);
        }
        if let Some(message) = routed.board_error {
            self.manager.record_error(message, events);
        }
    }
}

// ============================================================================
// BridgeInner - Socket Events
// ============================================================================

impl BridgeInner {
    fn mutate<R>(&self, op: impl FnOnce(&mut BridgeState, &mut Vec<BridgeEvent>) -> R) -> R {
        let result = {
            let mut state = self.state.lock();
            let mut events = Vec::new();
            let result = op(&mut *state, &mut events);
            // Queued under the state lock so delivery follows mutation order
            self.pending.push(events);
            result
        };
        self.pending.drain(&self.listeners);
        result
    }

    /// Starts the timer for a planned reconnect.
    fn schedule_retry(&self, plan: RetryPlan) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, reconnect skipped");
            return;
        };

        debug!(
            attempt = plan.attempt,
            delay_ms = plan.delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        let this = self.this.clone();
        runtime.spawn(async move {
            tokio::time::sleep(plan.delay).await;
            if let Some(inner) = this.upgrade() {
                inner.retry_due(plan.epoch);
            }
        });
    }

    /// Runs a planned reconnect unless it went stale meanwhile.
    fn retry_due(&self, epoch: u64) {
        self.mutate(|state, events| {
            if state.manager.epoch() != epoch {
                trace!("Reconnect cancelled by disconnect");
                return;
            }
            if state.registry.is_empty() || state.manager.current_id().is_some() {
                trace!("Reconnect no longer needed");
                return;
            }
            state.manager.reconnect(events);
        });
    }
}

impl SocketListener for BridgeInner {
    fn on_socket_event(&self, id: ConnectionId, event: SocketEvent) {
        let retry = self.mutate(|state, events| {
            if state.manager.current_id() != Some(id) {
                trace!(%id, ?event, "Dropping event from detached socket");
                return None;
            }

            match event {
                SocketEvent::Open => {
                    state.manager.handle_open(events);
                    state.resync(events);
                    None
                }
                SocketEvent::Text(raw) => {
                    state.route(&raw, events);
                    None
                }
                SocketEvent::Error(detail) => {
                    state.manager.handle_error(&detail, events);
                    None
                }
                SocketEvent::Closed => {
                    state.manager.handle_closed(events);
                    state.registry.clear_sent();
                    let topics_active = !state.registry.is_empty();
                    state.manager.plan_retry(topics_active)
                }
            }
        });

        if let Some(plan) = retry {
            self.schedule_retry(plan);
        }
    }
}
