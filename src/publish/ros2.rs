//! Publish sink backed by the `ros2` command line tool.

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::message::{OutboundMessage, cli_literal};
use super::{PublishSink, require_name};

// ============================================================================
// Constants
// ============================================================================

/// Executable looked up on `PATH` by default.
pub const ROS2_PROGRAM: &str = "ros2";

/// Text used when a failed command printed nothing.
const SILENT_FAILURE: &str = "ros2 command failed without output";

// ============================================================================
// Ros2CliSink
// ============================================================================

/// Publishes through one-shot `ros2 topic pub --once` invocations.
#[derive(Debug, Clone)]
pub struct Ros2CliSink {
    program: OsString,
}

impl Default for Ros2CliSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Ros2CliSink {
    /// Uses `ros2` from `PATH`.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(ROS2_PROGRAM)
    }

    /// Uses a specific executable.
    #[inline]
    #[must_use]
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs the CLI and maps a non-zero exit to [`Error::Publish`].
    async fn run(&self, subject: &str, args: &[String]) -> Result<()> {
        debug!(subject, ?args, "Running ros2 command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let message = [stderr, stdout]
            .into_iter()
            .find(|text| !text.is_empty())
            .unwrap_or_else(|| SILENT_FAILURE.to_owned());

        warn!(subject, status = %output.status, %message, "ros2 command failed");
        Err(Error::publish(subject, message))
    }
}

/// Arguments of `ros2 topic pub --once`.
pub(crate) fn topic_pub_args(topic: &str, message: &OutboundMessage) -> Vec<String> {
    vec![
        "topic".to_owned(),
        "pub".to_owned(),
        "--once".to_owned(),
        topic.to_owned(),
        message.type_name().to_owned(),
        message.to_cli_literal(),
    ]
}

/// Arguments of `ros2 param set`.
pub(crate) fn param_set_args(node: &str, parameter: &str, value: &Value) -> Vec<String> {
    vec![
        "param".to_owned(),
        "set".to_owned(),
        node.to_owned(),
        parameter.to_owned(),
        cli_literal(value).trim().to_owned(),
    ]
}

#[async_trait]
impl PublishSink for Ros2CliSink {
    fn name(&self) -> &'static str {
        "ros2-cli"
    }

    async fn publish(&self, topic: &str, message: &OutboundMessage) -> Result<()> {
        let topic = require_name("topic", topic)?;
        self.run(topic, &topic_pub_args(topic, message)).await
    }

    async fn set_parameter(&self, node: &str, parameter: &str, value: &Value) -> Result<()> {
        let node = require_name("node", node)?;
        let parameter = require_name("parameter", parameter)?;
        let subject = format!("{node}:{parameter}");
        self.run(&subject, &param_set_args(node, parameter, value))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
