//! Socket abstraction between the bridge and a concrete transport.
//!
//! The bridge never touches a WebSocket directly. It asks a [`Connector`] for
//! a fresh [`SocketHandle`] on every connection attempt and receives the
//! socket's lifecycle through the [`EventSink`] handed to `open`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use url::Url;

use crate::error::Result;
use crate::identifiers::ConnectionId;

// ============================================================================
// ReadyState
// ============================================================================

/// Lifecycle state of one physical socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Frames can be sent.
    Open = 1,
    /// Close requested, not finished.
    Closing = 2,
    /// Socket is gone.
    Closed = 3,
}

impl ReadyState {
    /// Converts a raw discriminant back into a state.
    ///
    /// Unknown values map to [`ReadyState::Closed`].
    #[inline]
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns `true` for `Connecting` and `Open`.
    #[inline]
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

// ============================================================================
// SocketEvent
// ============================================================================

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed.
    Open,
    /// Text frame received.
    Text(String),
    /// Transport failure. A `Closed` event normally follows.
    Error(String),
    /// Socket closed, by either side.
    Closed,
}

// ============================================================================
// SocketListener / EventSink
// ============================================================================

/// Receiver of socket events, implemented by the bridge.
pub trait SocketListener: Send + Sync {
    /// Handles one event from socket `id`.
    fn on_socket_event(&self, id: ConnectionId, event: SocketEvent);
}

/// Delivers events of one socket to its listener.
///
/// Holds the listener weakly: once the bridge is dropped, events go nowhere.
#[derive(Clone)]
pub struct EventSink {
    id: ConnectionId,
    listener: Weak<dyn SocketListener>,
}

impl EventSink {
    /// Creates a sink for socket `id`.
    #[inline]
    #[must_use]
    pub fn new(id: ConnectionId, listener: Weak<dyn SocketListener>) -> Self {
        Self { id, listener }
    }

    /// Returns the id of the socket this sink belongs to.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Forwards an event to the listener, if it is still alive.
    pub fn emit(&self, event: SocketEvent) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_socket_event(self.id, event);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("id", &self.id)
            .field("attached", &(self.listener.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Connector / SocketHandle
// ============================================================================

/// Opens sockets.
///
/// `open` must return without waiting for the handshake and must not call
/// back into the sink synchronously; the outcome arrives later as
/// [`SocketEvent::Open`] or [`SocketEvent::Error`] + [`SocketEvent::Closed`].
pub trait Connector: Send + Sync {
    /// Starts connecting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the attempt cannot even be started.
    fn open(&self, url: &Url, sink: EventSink) -> Result<Box<dyn SocketHandle>>;
}

/// Control surface of one open (or opening) socket.
pub trait SocketHandle: Send + Sync {
    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket is not open.
    fn send_text(&self, text: String) -> Result<()>;

    /// Requests the socket to close. Idempotent.
    fn close(&self);
}

// ============================================================================
// Tests
// ============================================================================
