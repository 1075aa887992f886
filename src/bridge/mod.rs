//! Connection, subscription and routing engine.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bridge`] | Context object consumers share |
//! | [`BridgeBuilder`] | Fluent configuration builder |
//! | [`BridgeOptions`] | Behaviour switches |
//! | [`ReconnectPolicy`] | Retry behaviour after unexpected closes |
//! | [`BridgeEvent`] | Change notifications |
//! | [`ConnectionState`] | Logical connection state |
//!
//! Internally the bridge is split into a Connection Manager (`manager`), a
//! Subscription Registry (`registry`) and a Message Router (`router`) that
//! is the only writer of the topic cache (`cache`).
//!
//! # Example
//!
//! ```no_run
//! use rosboard_bridge::{Bridge, BridgeEvent, SubscribeOptions};
//!
//! # async fn example() -> rosboard_bridge::Result<()> {
//! let bridge = Bridge::builder().build()?;
//! bridge.configure(Some("10.0.0.5"), Some(9999));
//!
//! let reader = bridge.clone();
//! bridge.on_change(move |event| {
//!     if let BridgeEvent::MessageUpdated { topic } = event {
//!         let _sample = reader.latest(topic);
//!     }
//! });
//!
//! bridge.subscribe("/imu", SubscribeOptions::with_rate(10.0));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for bridge configuration.
pub mod builder;

/// Topic catalog and message cache.
mod cache;

/// Core bridge implementation.
pub mod core;

/// Change notifications.
pub mod events;

/// Socket ownership and lifecycle state machine.
pub mod manager;

/// Options, endpoint and reconnect policy.
pub mod options;

/// Reference-counted subscriptions.
pub mod registry;

/// Inbound frame dispatch.
mod router;

#[cfg(test)]
mod tests;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BridgeBuilder;
pub use core::{Bridge, SubscribeOptions};
pub use events::{BridgeEvent, ChangeListener};
pub use manager::ConnectionState;
pub use options::{
    BridgeOptions, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY, DEFAULT_UPDATE_RATE, Endpoint,
    ReconnectPolicy,
};
pub use registry::Subscription;
