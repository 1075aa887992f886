//! Outbound publishing to the robot middleware.
//!
//! Publishing is independent of the subscription engine: the bridge only
//! reads from the board, while joystick and mode controls write through a
//! [`PublishSink`].
//!
//! # Sinks
//!
//! | Sink | Used when |
//! |------|-----------|
//! | [`Ros2CliSink`] | a `ros2` executable is on `PATH` |
//! | [`RecordingSink`] | otherwise, and in tests |
//!
//! [`detect_sink`] picks one at startup; callers hold an
//! `Arc<dyn PublishSink>` and never branch on which one they got.
//!
//! # Example
//!
//! ```no_run
//! use rosboard_bridge::publish::{OutboundMessage, detect_sink};
//!
//! # async fn example() -> rosboard_bridge::Result<()> {
//! let sink = detect_sink();
//! sink.publish("/joy", &OutboundMessage::Float32MultiArray(vec![0.0, 0.5]))
//!     .await?;
//! sink.publish("/mode", &OutboundMessage::mode_switch(true, "arm")?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// In-memory recording sink.
pub mod memory;

/// Outbound message kinds.
pub mod message;

/// `ros2` command line sink.
pub mod ros2;

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{Published, RecordingSink};
pub use message::{DriveMode, OutboundMessage, cli_literal};
pub use ros2::{ROS2_PROGRAM, Ros2CliSink};

// ============================================================================
// PublishSink
// ============================================================================

/// Capability to publish messages and set parameters on the robot.
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Publishes one message on `topic`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `topic` is blank
    /// - [`Error::Publish`] if the middleware rejected the message
    async fn publish(&self, topic: &str, message: &OutboundMessage) -> Result<()>;

    /// Sets parameter `parameter` of `node`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if a name is blank
    /// - [`Error::Publish`] if the middleware rejected the value
    async fn set_parameter(&self, node: &str, parameter: &str, value: &Value) -> Result<()>;
}

/// Trims a caller-supplied name, rejecting blank ones.
pub(crate) fn require_name<'a>(kind: &str, raw: &'a str) -> Result<&'a str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::invalid_argument(format!("{kind} name is required")));
    }
    Ok(name)
}

// ============================================================================
// Capability Probe
// ============================================================================

/// Selects the sink for this machine.
///
/// Returns a [`Ros2CliSink`] when `ros2` is on `PATH`, a [`RecordingSink`]
/// otherwise.
#[must_use]
pub fn detect_sink() -> Arc<dyn PublishSink> {
    let path = env::var_os("PATH");
    select_sink(path.as_deref())
}

fn select_sink(path: Option<&OsStr>) -> Arc<dyn PublishSink> {
    match find_program(ROS2_PROGRAM, path) {
        Some(program) => {
            info!(program = %program.display(), "Publishing through ros2 CLI");
            Arc::new(Ros2CliSink::with_program(program))
        }
        None => {
            info!("ros2 not found on PATH, recording publishes in memory");
            Arc::new(RecordingSink::new())
        }
    }
}

/// Finds an executable file named `name` in a `PATH`-style list.
fn find_program(name: &str, path: Option<&OsStr>) -> Option<PathBuf> {
    env::split_paths(path?)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// Tests
// ============================================================================
