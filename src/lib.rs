//! ROSboard bridge - Reference-counted topic subscriptions over one WebSocket.
//!
//! This library keeps exactly one WebSocket open to a ROSboard server and
//! lets any number of independent consumers subscribe to its topics without
//! knowing about each other or about the socket.
//!
//! # Architecture
//!
//! ```text
//! consumers ──subscribe/unsubscribe──► Subscription Registry ──SUB/UNSUB──┐
//!     ▲                                                                   ▼
//!     │ on_change                                              Connection Manager ◄──► board
//!     │                                                                   │
//! Topic Cache ◄────────── Message Router ◄──── Frame Codec ◄──── raw text ┘
//! ```
//!
//! Key design principles:
//!
//! - One [`Bridge`] context object, cloned into every consumer (no globals)
//! - A topic stays subscribed on the wire while its refcount is above zero
//! - Every socket open resends all active subscriptions
//! - Errors never reach subscribers; they surface as [`Bridge::last_error`]
//!   and [`ConnectionState::Error`]
//!
//! # Quick Start
//!
//! ```no_run
//! use rosboard_bridge::{Bridge, BridgeEvent, Result, SubscribeOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::builder()
//!         .host("10.0.0.5")
//!         .port(9999)
//!         .build()?;
//!
//!     let reader = bridge.clone();
//!     bridge.on_change(move |event| {
//!         if let BridgeEvent::MessageUpdated { topic } = event {
//!             if let Some(sample) = reader.latest(topic) {
//!                 println!("{topic}: {}", sample.to_value());
//!             }
//!         }
//!     });
//!
//!     bridge.subscribe("/imu", SubscribeOptions::with_rate(10.0));
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     bridge.unsubscribe("/imu");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | [`Bridge`], builder, options, change events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection and listener ids |
//! | [`protocol`] | ROSboard v1 frames and codec |
//! | [`publish`] | Outbound publish sinks |
//! | [`transport`] | Socket abstraction and tokio-tungstenite connector |

// ============================================================================
// Modules
// ============================================================================

/// Connection, subscription and routing engine.
///
/// Use [`Bridge::builder()`] to create a configured bridge.
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// ROSboard v1 wire protocol.
pub mod protocol;

/// Outbound publishing through the robot middleware.
pub mod publish;

/// WebSocket transport layer.
///
/// The [`Connector`] trait is the seam for custom transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    Bridge, BridgeBuilder, BridgeEvent, BridgeOptions, ConnectionState, DEFAULT_PORT,
    DEFAULT_RECONNECT_DELAY, DEFAULT_UPDATE_RATE, Endpoint, ReconnectPolicy, SubscribeOptions,
    Subscription,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, ListenerId};

// Protocol types
pub use protocol::{Frame, TopicMessage};

// Publish types
pub use publish::{DriveMode, OutboundMessage, PublishSink, detect_sink};

// Transport types
pub use transport::{Connector, WebSocketConnector};
