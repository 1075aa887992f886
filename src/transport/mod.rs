//! WebSocket transport layer.
//!
//! This module owns everything between the bridge and the network.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Bridge (Rust)  │                              │  ROSboard       │
//! │                 │         WebSocket            │  (the board)    │
//! │  Connector      │─────────────────────────────►│                 │
//! │  → SocketHandle │◄────────────────────────────►│  /rosboard/v1   │
//! │  ← EventSink    │       host:port              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Socket Lifecycle
//!
//! 1. `Connector::open` - Start a fresh socket, returns immediately
//! 2. `SocketEvent::Open` - Handshake done, frames may flow
//! 3. `SocketEvent::Text` - One per inbound frame
//! 4. `SocketEvent::Error` / `SocketEvent::Closed` - Socket is gone
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | tokio-tungstenite socket and event loop |
//! | `socket` | Connector, handle and event types |

// ============================================================================
// Submodules
// ============================================================================

/// tokio-tungstenite socket and event loop.
pub mod connection;

/// Connector, handle and event types.
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{DEFAULT_CONNECT_TIMEOUT, WebSocketConnector, WebSocketHandle};
pub use socket::{Connector, EventSink, ReadyState, SocketEvent, SocketHandle, SocketListener};
