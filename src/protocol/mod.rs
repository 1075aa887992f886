//! ROSboard v1 wire protocol.
//!
//! Frames are JSON arrays `[tag, payload]` exchanged over one WebSocket at
//! `/rosboard/v1`.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Payload |
//! |-------|-----------|---------|
//! | SUB `s` | Client → Board | `{topicName, maxUpdateRate}` |
//! | UNSUB `u` | Client → Board | `{topicName}` |
//! | PONG `q` | Client → Board | `{s: seq, t: millis}` |
//! | PING `p` | Board → Client | `{s: seq}` |
//! | MSG `m` | Board → Client | `{_topic_name, _topic_type?, _error?, ...}` |
//! | TOPICS `t` | Board → Client | `{topicName: topicType, ...}` |
//! | SYSTEM `y` | Board → Client | opaque object |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Text encoding and tolerant decoding |
//! | `frame` | Typed frame union and tag constants |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encoding and tolerant decoding.
pub mod codec;

/// Typed frames and tag constants.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{decode, encode};
pub use frame::{Frame, TopicMessage, tag};

/// Path of the ROSboard v1 WebSocket endpoint.
pub const ENDPOINT_PATH: &str = "/rosboard/v1";
