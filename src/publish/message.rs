//! Outbound message kinds the dashboard publishes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// DriveMode
// ============================================================================

/// Rover control mode carried by a mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// Joystick drives the wheels.
    Wheel,
    /// Joystick drives the arm.
    Arm,
}

impl DriveMode {
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wheel => "wheel",
            Self::Arm => "arm",
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriveMode {
    type Err = Error;

    /// Parses `wheel` or `arm`, ignoring case and surrounding whitespace.
    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "wheel" => Ok(Self::Wheel),
            "arm" => Ok(Self::Arm),
            _ => Err(Error::invalid_argument(format!(
                "Unknown drive mode '{raw}', expected 'wheel' or 'arm'"
            ))),
        }
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// One message to publish on a topic.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// `std_msgs/msg/Float32MultiArray`, e.g. joystick axes.
    Float32MultiArray(Vec<f32>),
    /// `std_msgs/msg/Int32`.
    Int32(i32),
    /// `std_msgs/msg/Int16`.
    Int16(i16),
    /// `global_interfaces/msg/ModeSwitch`.
    ModeSwitch {
        /// Whether control is enabled.
        enabled: bool,
        /// Selected mode.
        mode: DriveMode,
    },
}

impl OutboundMessage {
    /// Creates an Int16 message, clamping `value` into range.
    #[must_use]
    pub fn int16_saturating(value: i32) -> Self {
        let clamped = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        Self::Int16(clamped as i16)
    }

    /// Creates a mode switch from a textual mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `mode` is neither `wheel` nor `arm`.
    pub fn mode_switch(enabled: bool, mode: &str) -> Result<Self> {
        Ok(Self::ModeSwitch {
            enabled,
            mode: mode.parse()?,
        })
    }

    /// Fully qualified message type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Float32MultiArray(_) => "std_msgs/msg/Float32MultiArray",
            Self::Int32(_) => "std_msgs/msg/Int32",
            Self::Int16(_) => "std_msgs/msg/Int16",
            Self::ModeSwitch { .. } => "global_interfaces/msg/ModeSwitch",
        }
    }

    /// Message fields as JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Float32MultiArray(data) => json!({ "data": data }),
            Self::Int32(value) => json!({ "data": value }),
            Self::Int16(value) => json!({ "data": value }),
            Self::ModeSwitch { enabled, mode } => json!({ "enabled": enabled, "mode": mode }),
        }
    }

    /// Message fields in the YAML flow syntax `ros2 topic pub` accepts.
    ///
    /// Floats keep a decimal point so the middleware does not read them as
    /// integers.
    #[must_use]
    pub fn to_cli_literal(&self) -> String {
        match self {
            Self::Float32MultiArray(data) => {
                let items: Vec<String> = data.iter().map(|value| format!("{value:?}")).collect();
                format!("{{data: [{}]}}", items.join(", "))
            }
            Self::Int32(value) => format!("{{data: {value}}}"),
            Self::Int16(value) => format!("{{data: {value}}}"),
            Self::ModeSwitch { enabled, mode } => format!("{{enabled: {enabled}, mode: {mode}}}"),
        }
    }
}

/// Renders a JSON value in YAML flow syntax for the middleware CLI.
///
/// Strings are emitted bare.
#[must_use]
pub fn cli_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(cli_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(key, field)| format!("{key}: {}", cli_literal(field)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
