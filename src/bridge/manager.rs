//! Connection Manager: the one physical socket and its state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected --close--> Disconnected
//! Connecting | Connected --error--> Error --close--> Disconnected
//! ```
//!
//! The manager is the only code that opens or closes sockets. It does not
//! know about subscriptions; the bridge tells it whether topics are still
//! wanted when a retry decision is due.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::identifiers::ConnectionId;
use crate::protocol::{Frame, encode};
use crate::transport::{Connector, EventSink, ReadyState, SocketHandle, SocketListener};

use super::events::BridgeEvent;
use super::options::{BridgeOptions, Endpoint, ReconnectPolicy};

// ============================================================================
// ConnectionState
// ============================================================================

/// Logical connection state seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open, frames flowing.
    Connected,
    /// Last attempt or socket failed.
    Error,
}

impl ConnectionState {
    /// Lowercase name, as the dashboard displays it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectOutcome {
    /// A connecting or open socket already exists.
    AlreadyActive,
    /// A fresh socket is connecting.
    Opened,
    /// No socket could be started; the reason was recorded.
    Failed,
}

/// A reconnect the bridge should run after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPlan {
    pub delay: Duration,
    /// Epoch the plan belongs to; stale once a deliberate disconnect happens.
    pub epoch: u64,
    /// 1-based attempt number.
    pub attempt: u32,
}

// ============================================================================
// ConnectionManager
// ============================================================================

struct LiveSocket {
    id: ConnectionId,
    url: Url,
    handle: Box<dyn SocketHandle>,
}

pub(crate) struct ConnectionManager {
    endpoint: Endpoint,
    secure: bool,
    status: ConnectionState,
    last_error: Option<String>,
    socket: Option<LiveSocket>,
    /// Id of the most recently opened socket.
    last_id: ConnectionId,
    disconnect_when_idle: bool,
    policy: ReconnectPolicy,
    /// Retries consumed since the last open or caller-initiated connect.
    attempts: u32,
    /// Bumped by every deliberate disconnect.
    epoch: u64,
    connector: Arc<dyn Connector>,
    listener: Weak<dyn SocketListener>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status)
            .field("socket", &self.socket.as_ref().map(|live| live.id))
            .field("attempts", &self.attempts)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Construction & Reads
// ============================================================================

impl ConnectionManager {
    pub(crate) fn new(
        endpoint: Endpoint,
        options: &BridgeOptions,
        connector: Arc<dyn Connector>,
        listener: Weak<dyn SocketListener>,
    ) -> Self {
        Self {
            endpoint,
            secure: options.secure,
            status: ConnectionState::Disconnected,
            last_error: None,
            socket: None,
            last_id: ConnectionId::new(0),
            disconnect_when_idle: options.disconnect_when_idle,
            policy: options.reconnect,
            attempts: 0,
            epoch: 0,
            connector,
            listener,
        }
    }

    #[inline]
    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[inline]
    pub(crate) fn status(&self) -> ConnectionState {
        self.status
    }

    #[inline]
    pub(crate) fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// URL the next connect would use.
    pub(crate) fn url(&self) -> Option<Url> {
        self.endpoint.url(self.secure).ok()
    }

    /// Id of the live socket, if any.
    #[inline]
    pub(crate) fn current_id(&self) -> Option<ConnectionId> {
        self.socket.as_ref().map(|live| live.id)
    }

    #[inline]
    pub(crate) fn socket_state(&self) -> Option<ReadyState> {
        self.socket.as_ref().map(|live| live.handle.ready_state())
    }

    /// Returns `true` when there is no socket or only a closed one.
    #[inline]
    pub(crate) fn needs_socket(&self) -> bool {
        matches!(self.socket_state(), None | Some(ReadyState::Closed))
    }

    /// Returns `true` once the open event was handled and the socket is
    /// still open.
    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        self.status == ConnectionState::Connected
            && self.socket_state() == Some(ReadyState::Open)
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub(crate) fn disconnect_when_idle(&self) -> bool {
        self.disconnect_when_idle
    }

    #[inline]
    pub(crate) fn set_disconnect_when_idle(&mut self, disconnect: bool) {
        self.disconnect_when_idle = disconnect;
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Updates the supplied parts of the endpoint. Never touches the socket.
    pub(crate) fn configure(&mut self, host: Option<&str>, port: Option<u16>) {
        if let Some(host) = host {
            self.endpoint.host = host.trim().to_owned();
        }
        if let Some(port) = port {
            self.endpoint.port = port;
        }
        info!(endpoint = %self.endpoint, "Board endpoint configured");
    }

    /// Caller-initiated connect. Resets the retry budget.
    pub(crate) fn connect(&mut self, events: &mut Vec<BridgeEvent>) -> ConnectOutcome {
        self.attempts = 0;
        self.open(events)
    }

    /// Timer-initiated connect. Keeps the retry budget.
    pub(crate) fn reconnect(&mut self, events: &mut Vec<BridgeEvent>) -> ConnectOutcome {
        self.open(events)
    }

    fn open(&mut self, events: &mut Vec<BridgeEvent>) -> ConnectOutcome {
        if self.socket_state().is_some_and(ReadyState::is_usable) {
            return ConnectOutcome::AlreadyActive;
        }

        let url = match self.endpoint.url(self.secure) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "Cannot connect");
                self.record_error(err.to_string(), events);
                self.set_status(ConnectionState::Error, events);
                return ConnectOutcome::Failed;
            }
        };

        self.close_socket();

        let id = self.last_id.next();
        self.last_id = id;
        let sink = EventSink::new(id, self.listener.clone());

        match self.connector.open(&url, sink) {
            Ok(handle) => {
                info!(%id, %url, "Connecting to board");
                self.socket = Some(LiveSocket { id, url, handle });
                self.last_error = None;
                self.set_status(ConnectionState::Connecting, events);
                ConnectOutcome::Opened
            }
            Err(err) => {
                warn!(%url, error = %err, "Failed to start connection");
                self.record_error(err.to_string(), events);
                self.set_status(ConnectionState::Error, events);
                ConnectOutcome::Failed
            }
        }
    }

    /// Deliberate teardown. Pending retries become stale.
    pub(crate) fn disconnect(&mut self, clear_config: bool, events: &mut Vec<BridgeEvent>) {
        if clear_config {
            self.endpoint = Endpoint::default();
        }
        self.close_socket();
        self.epoch = self.epoch.wrapping_add(1);
        self.set_status(ConnectionState::Disconnected, events);
    }

    /// Forgets the live socket, which detaches its events, then closes it.
    fn close_socket(&mut self) {
        if let Some(live) = self.socket.take() {
            info!(id = %live.id, url = %live.url, "Closing socket");
            live.handle.close();
        }
    }

    pub(crate) fn handle_open(&mut self, events: &mut Vec<BridgeEvent>) {
        if let Some(live) = &self.socket {
            info!(id = %live.id, url = %live.url, "Connected to board");
        }
        self.attempts = 0;
        self.set_status(ConnectionState::Connected, events);
    }

    pub(crate) fn handle_error(&mut self, detail: &str, events: &mut Vec<BridgeEvent>) {
        let url = self
            .socket
            .as_ref()
            .map_or_else(|| self.endpoint.to_string(), |live| live.url.to_string());
        debug!(%url, detail, "Socket error");
        self.set_status(ConnectionState::Error, events);
        self.record_error(format!("Failed to connect to ROSboard at {url}"), events);
    }

    pub(crate) fn handle_closed(&mut self, events: &mut Vec<BridgeEvent>) {
        if let Some(live) = self.socket.take() {
            info!(id = %live.id, "Socket closed");
        }
        self.set_status(ConnectionState::Disconnected, events);
    }

    /// Decides whether a close should be followed by a retry.
    ///
    /// Consumes one attempt when it returns a plan.
    pub(crate) fn plan_retry(&mut self, topics_active: bool) -> Option<RetryPlan> {
        if self.disconnect_when_idle || !topics_active {
            return None;
        }

        let attempt = self.attempts.saturating_add(1);
        match self.policy.delay_for(attempt) {
            Some(delay) => {
                self.attempts = attempt;
                Some(RetryPlan {
                    delay,
                    epoch: self.epoch,
                    attempt,
                })
            }
            None => {
                if !matches!(self.policy, ReconnectPolicy::Never) {
                    warn!(attempts = self.attempts, "Reconnect attempts exhausted");
                }
                None
            }
        }
    }
}

// ============================================================================
// ConnectionManager - Sending & Errors
// ============================================================================

impl ConnectionManager {
    /// Sends a frame on the open socket.
    ///
    /// Returns `false` when nothing was sent. Failures are recorded as the
    /// last error, never returned.
    pub(crate) fn send(&mut self, frame: &Frame, events: &mut Vec<BridgeEvent>) -> bool {
        let Some(live) = self.socket.as_ref() else {
            return false;
        };
        if live.handle.ready_state() != ReadyState::Open {
            return false;
        }

        let result = encode(frame).and_then(|text| live.handle.send_text(text));
        match result {
            Ok(()) => {
                trace!(tag = frame.tag(), "Frame sent");
                true
            }
            Err(err) => {
                warn!(tag = frame.tag(), error = %err, "Failed to send frame");
                self.record_error(err.to_string(), events);
                false
            }
        }
    }

    pub(crate) fn record_error(&mut self, message: impl Into<String>, events: &mut Vec<BridgeEvent>) {
        let message = message.into();
        self.last_error = Some(message.clone());
        events.push(BridgeEvent::ErrorRecorded(message));
    }

    /// Records the error returned for a connect with no host.
    pub(crate) fn record_unconfigured(&mut self, events: &mut Vec<BridgeEvent>) {
        self.record_error(Error::NotConfigured.to_string(), events);
    }

    fn set_status(&mut self, status: ConnectionState, events: &mut Vec<BridgeEvent>) {
        if self.status != status {
            debug!(from = %self.status, to = %status, "Connection state changed");
            self.status = status;
            events.push(BridgeEvent::StatusChanged(status));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
