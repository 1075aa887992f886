//! Frame types for the ROSboard v1 protocol.
//!
//! Every frame on the wire is a JSON array `[tag, payload]` where `tag` is a
//! one-character string.
//!
//! # Tags
//!
//! | Tag | Frame | Direction |
//! |-----|-------|-----------|
//! | `p` | [`Frame::Ping`] | Board → Client |
//! | `q` | [`Frame::Pong`] | Client → Board |
//! | `m` | [`Frame::Msg`] | Board → Client |
//! | `t` | [`Frame::Topics`] | Board → Client |
//! | `y` | [`Frame::System`] | Board → Client |
//! | `s` | [`Frame::Subscribe`] | Client → Board |
//! | `u` | [`Frame::Unsubscribe`] | Client → Board |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

// ============================================================================
// Tags
// ============================================================================

/// One-character frame tags.
pub mod tag {
    /// Keepalive ping from the board.
    pub const PING: &str = "p";
    /// Keepalive answer from the client.
    pub const PONG: &str = "q";
    /// Data sample for one topic.
    pub const MSG: &str = "m";
    /// Full topic catalog snapshot.
    pub const TOPICS: &str = "t";
    /// Board system information.
    pub const SYSTEM: &str = "y";
    /// Subscribe request.
    pub const SUB: &str = "s";
    /// Unsubscribe request.
    pub const UNSUB: &str = "u";
}

/// Sequence number key in PING and PONG payloads.
pub(crate) const SEQ_KEY: &str = "s";

/// Client timestamp key in PONG payloads.
pub(crate) const TIME_KEY: &str = "t";

/// Topic name key in MSG payloads.
pub(crate) const TOPIC_NAME_KEY: &str = "_topic_name";

/// Topic type key in MSG payloads.
pub(crate) const TOPIC_TYPE_KEY: &str = "_topic_type";

/// Embedded error key in MSG payloads.
pub(crate) const ERROR_KEY: &str = "_error";

// ============================================================================
// TopicMessage
// ============================================================================

/// A data sample for one topic, as carried by a MSG frame.
///
/// `payload` keeps every field the board sent, including the underscore
/// metadata fields, so consumers see the sample exactly as it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    /// Topic the sample belongs to.
    pub topic_name: String,
    /// Topic type, when the board included it.
    pub topic_type: Option<String>,
    /// Error reported by the board for this topic.
    pub error: Option<String>,
    /// Full payload object.
    pub payload: Map<String, Value>,
}

impl TopicMessage {
    /// Returns a field of the sample.
    #[inline]
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns the payload as a JSON object value.
    #[inline]
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keepalive ping. The sequence number is echoed back verbatim.
    Ping {
        /// Board sequence number.
        seq: Value,
    },

    /// Keepalive answer.
    Pong {
        /// Echoed sequence number.
        seq: Value,
        /// Client wall clock in milliseconds.
        time_ms: i64,
    },

    /// Data sample.
    Msg(TopicMessage),

    /// Topic catalog snapshot, topic name to topic type.
    Topics(BTreeMap<String, String>),

    /// Board metadata, stored without interpretation.
    System(Value),

    /// Subscribe to a topic.
    Subscribe {
        /// Topic to subscribe.
        topic_name: String,
        /// Maximum messages per second the board should forward.
        max_update_rate: f64,
    },

    /// Unsubscribe from a topic.
    Unsubscribe {
        /// Topic to unsubscribe.
        topic_name: String,
    },

    /// Frame with a tag this client does not know.
    Unknown {
        /// The unrecognised tag.
        tag: String,
    },
}

impl Frame {
    /// Creates a SUB frame.
    #[inline]
    #[must_use]
    pub fn subscribe(topic_name: impl Into<String>, max_update_rate: f64) -> Self {
        Self::Subscribe {
            topic_name: topic_name.into(),
            max_update_rate,
        }
    }

    /// Creates an UNSUB frame.
    #[inline]
    #[must_use]
    pub fn unsubscribe(topic_name: impl Into<String>) -> Self {
        Self::Unsubscribe {
            topic_name: topic_name.into(),
        }
    }

    /// Creates the PONG answering a PING with `seq`.
    #[inline]
    #[must_use]
    pub fn pong(seq: Value, time_ms: i64) -> Self {
        Self::Pong { seq, time_ms }
    }

    /// Returns the wire tag of this frame.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Ping { .. } => tag::PING,
            Self::Pong { .. } => tag::PONG,
            Self::Msg(_) => tag::MSG,
            Self::Topics(_) => tag::TOPICS,
            Self::System(_) => tag::SYSTEM,
            Self::Subscribe { .. } => tag::SUB,
            Self::Unsubscribe { .. } => tag::UNSUB,
            Self::Unknown { tag } => tag,
        }
    }

    /// Builds the `[tag, payload]` array for this frame.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let payload = match self {
            Self::Ping { seq } => json!({ SEQ_KEY: seq }),
            Self::Pong { seq, time_ms } => json!({ SEQ_KEY: seq, TIME_KEY: time_ms }),
            Self::Msg(message) => message.to_value(),
            Self::Topics(topics) => json!(topics),
            Self::System(info) => info.clone(),
            Self::Subscribe {
                topic_name,
                max_update_rate,
            } => json!({
                "topicName": topic_name,
                "maxUpdateRate": rate_value(*max_update_rate),
            }),
            Self::Unsubscribe { topic_name } => json!({ "topicName": topic_name }),
            Self::Unknown { .. } => Value::Object(Map::new()),
        };
        json!([self.tag(), payload])
    }
}

/// Renders an update rate the way the board expects it.
///
/// Integral rates go out as integers (`10`, not `10.0`).
fn rate_value(rate: f64) -> Value {
    if rate.is_finite() && rate.fract() == 0.0 && rate.abs() < i64::MAX as f64 {
        json!(rate as i64)
    } else {
        json!(rate)
    }
}

// ============================================================================
// Tests
// ============================================================================
