//! Frame encoding and decoding.
//!
//! Decoding runs in three steps:
//!
//! 1. Parse the text as strict JSON, falling back to JSON5 (unquoted keys,
//!    single quotes, trailing commas) when that fails.
//! 2. Check the shape: an array of at least two elements whose first element
//!    is a string tag. Anything else is not a frame and is discarded.
//! 3. Narrow the payload into the typed [`Frame`] for its tag.
//!
//! Step 1 and step 3 failures are protocol errors. Step 2 failures are
//! silent: [`decode`] returns `Ok(None)`.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};

use super::frame::{
    ERROR_KEY, Frame, SEQ_KEY, TIME_KEY, TOPIC_NAME_KEY, TOPIC_TYPE_KEY, TopicMessage, tag,
};

// ============================================================================
// Encode
// ============================================================================

/// Encodes a frame as JSON array text.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode(frame: &Frame) -> Result<String> {
    Ok(serde_json::to_string(&frame.to_value())?)
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes one text message from the board.
///
/// Returns `Ok(None)` when the text parses but is not a frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] when neither parser accepts the text or the
/// payload does not fit its tag.
pub fn decode(raw: &str) -> Result<Option<Frame>> {
    let value = parse_lenient(raw)?;

    let Value::Array(mut items) = value else {
        trace!("Discarding non-array frame");
        return Ok(None);
    };
    if items.len() < 2 {
        trace!(len = items.len(), "Discarding short frame");
        return Ok(None);
    }

    let payload = items.swap_remove(1);
    let Value::String(tag) = items.swap_remove(0) else {
        trace!("Discarding frame with non-string tag");
        return Ok(None);
    };

    narrow(tag, payload).map(Some)
}

/// Parses strict JSON first, then JSON5.
fn parse_lenient(raw: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(strict) => json5::from_str::<Value>(raw).map_err(|relaxed| {
            trace!(error = %strict, "Strict JSON parse failed");
            Error::protocol(format!("Unparseable frame: {relaxed}"))
        }),
    }
}

/// Turns a tagged payload into a typed frame.
fn narrow(frame_tag: String, payload: Value) -> Result<Frame> {
    match frame_tag.as_str() {
        tag::PING => {
            let seq = payload
                .get(SEQ_KEY)
                .cloned()
                .ok_or_else(|| Error::protocol("PING without sequence number"))?;
            Ok(Frame::Ping { seq })
        }

        tag::PONG => {
            let seq = payload.get(SEQ_KEY).cloned().unwrap_or(Value::Null);
            let time_ms = payload
                .get(TIME_KEY)
                .and_then(Value::as_i64)
                .unwrap_or_default();
            Ok(Frame::Pong { seq, time_ms })
        }

        tag::MSG => narrow_message(payload).map(Frame::Msg),

        tag::TOPICS => narrow_topics(payload).map(Frame::Topics),

        tag::SYSTEM => Ok(Frame::System(payload)),

        tag::SUB => {
            let topic_name = topic_name_field(&payload, "topicName")?;
            let max_update_rate = payload
                .get("maxUpdateRate")
                .and_then(Value::as_f64)
                .unwrap_or_default();
            Ok(Frame::Subscribe {
                topic_name,
                max_update_rate,
            })
        }

        tag::UNSUB => Ok(Frame::Unsubscribe {
            topic_name: topic_name_field(&payload, "topicName")?,
        }),

        _ => Ok(Frame::Unknown { tag: frame_tag }),
    }
}

fn narrow_message(payload: Value) -> Result<TopicMessage> {
    let Value::Object(payload) = payload else {
        return Err(Error::protocol("MSG payload is not an object"));
    };

    let topic_name = match payload.get(TOPIC_NAME_KEY) {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => return Err(Error::protocol("MSG without topic name")),
    };

    let topic_type = match payload.get(TOPIC_TYPE_KEY) {
        Some(Value::String(kind)) if !kind.is_empty() => Some(kind.clone()),
        _ => None,
    };

    let error = match payload.get(ERROR_KEY) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };

    Ok(TopicMessage {
        topic_name,
        topic_type,
        error,
        payload,
    })
}

fn narrow_topics(payload: Value) -> Result<BTreeMap<String, String>> {
    let Value::Object(entries) = payload else {
        return Err(Error::protocol("TOPICS payload is not an object"));
    };

    entries
        .into_iter()
        .map(|(name, kind)| match kind {
            Value::String(kind) => Ok((name, kind)),
            other => Err(Error::protocol(format!(
                "TOPICS entry {name} has non-string type {other}"
            ))),
        })
        .collect()
}

fn topic_name_field(payload: &Value, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::protocol(format!("Missing {key}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_encode_subscribe() {
        let text = encode(&Frame::subscribe("/imu", 10.0)).expect("encode");
        let value: Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value, json!(["s", {"topicName": "/imu", "maxUpdateRate": 10}]));
        assert!(text.starts_with(r#"["s","#));
    }

    #[test]
    fn test_decode_ping() {
        let frame = decode(r#"["p", {"s": 7}]"#).expect("decode");
        assert_eq!(frame, Some(Frame::Ping { seq: json!(7) }));
    }

    #[test]
    fn test_decode_ping_without_seq_is_error() {
        let err = decode(r#"["p", {}]"#).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_decode_msg() {
        let frame = decode(r#"["m", {"_topic_name": "/x", "_topic_type": "T", "val": 1}]"#)
            .expect("decode")
            .expect("frame");

        let Frame::Msg(message) = frame else {
            panic!("expected MSG");
        };
        assert_eq!(message.topic_name, "/x");
        assert_eq!(message.topic_type.as_deref(), Some("T"));
        assert_eq!(message.error, None);
        assert_eq!(message.field("val"), Some(&json!(1)));
    }

    #[test]
    fn test_decode_msg_with_error() {
        let frame = decode(r#"["m", {"_topic_name": "/cam", "_error": "no publisher"}]"#)
            .expect("decode")
            .expect("frame");
        let Frame::Msg(message) = frame else {
            panic!("expected MSG");
        };
        assert_eq!(message.error.as_deref(), Some("no publisher"));
    }

    #[test]
    fn test_decode_msg_without_topic_is_error() {
        assert!(decode(r#"["m", {"val": 1}]"#).is_err());
        assert!(decode(r#"["m", {"_topic_name": ""}]"#).is_err());
        assert!(decode(r#"["m", 3]"#).is_err());
    }

    #[test]
    fn test_decode_topics() {
        let frame = decode(r#"["t", {"/imu": "sensor_msgs/Imu", "/odom": "nav_msgs/Odometry"}]"#)
            .expect("decode")
            .expect("frame");
        let Frame::Topics(topics) = frame else {
            panic!("expected TOPICS");
        };
        assert_eq!(topics.len(), 2);
        assert_eq!(topics["/imu"], "sensor_msgs/Imu");
    }

    #[test]
    fn test_decode_topics_rejects_non_string_type() {
        assert!(decode(r#"["t", {"/imu": 4}]"#).is_err());
        assert!(decode(r#"["t", []]"#).is_err());
    }

    #[test]
    fn test_decode_system_verbatim() {
        let frame = decode(r#"["y", {"hostname": "rover", "version": [1, 2]}]"#)
            .expect("decode")
            .expect("frame");
        assert_eq!(
            frame,
            Frame::System(json!({"hostname": "rover", "version": [1, 2]}))
        );
    }

    #[test]
    fn test_decode_control_echoes() {
        let sub = decode(r#"["s", {"topicName": "/a", "maxUpdateRate": 5}]"#)
            .expect("decode")
            .expect("frame");
        assert_eq!(sub, Frame::subscribe("/a", 5.0));

        let unsub = decode(r#"["u", {"topicName": "/a"}]"#)
            .expect("decode")
            .expect("frame");
        assert_eq!(unsub, Frame::unsubscribe("/a"));
    }

    #[test]
    fn test_decode_unknown_tag() {
        let frame = decode(r#"["z", {}]"#).expect("decode");
        assert_eq!(frame, Some(Frame::Unknown { tag: "z".into() }));
    }

    #[test]
    fn test_lenient_fallback() {
        let frame = decode("['m', {_topic_name: '/x', val: 'ok',},]")
            .expect("decode")
            .expect("frame");
        let Frame::Msg(message) = frame else {
            panic!("expected MSG");
        };
        assert_eq!(message.topic_name, "/x");
        assert_eq!(message.field("val"), Some(&json!("ok")));
    }

    #[test]
    fn test_shape_violations_are_discarded() {
        assert_eq!(decode(r#"{"p": 1}"#).expect("decode"), None);
        assert_eq!(decode(r#"["p"]"#).expect("decode"), None);
        assert_eq!(decode("[]").expect("decode"), None);
        assert_eq!(decode(r#"[1, {}]"#).expect("decode"), None);
        assert_eq!(decode("42").expect("decode"), None);
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let err = decode("not json at all {").unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_extra_elements_ignored() {
        let frame = decode(r#"["p", {"s": 1}, "extra"]"#).expect("decode");
        assert_eq!(frame, Some(Frame::Ping { seq: json!(1) }));
    }
}
