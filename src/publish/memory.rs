//! In-process publish sink that records instead of publishing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

use super::message::OutboundMessage;
use super::{PublishSink, require_name};

/// One call a [`RecordingSink`] received.
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    /// A topic publish.
    Message {
        topic: String,
        message: OutboundMessage,
    },
    /// A parameter update.
    Parameter {
        node: String,
        parameter: String,
        value: Value,
    },
}

/// Keeps every publish in memory.
///
/// Selected when no middleware CLI is available, so the dashboard keeps
/// working (and the last commanded values stay inspectable) without a robot.
#[derive(Debug, Default)]
pub struct RecordingSink {
    log: Mutex<Vec<Published>>,
}

impl RecordingSink {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.log.lock().clone()
    }

    /// Last message published on `topic`.
    #[must_use]
    pub fn last_message(&self, topic: &str) -> Option<OutboundMessage> {
        self.log.lock().iter().rev().find_map(|entry| match entry {
            Published::Message {
                topic: recorded,
                message,
            } if recorded == topic => Some(message.clone()),
            _ => None,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, topic: &str, message: &OutboundMessage) -> Result<()> {
        let topic = require_name("topic", topic)?;
        debug!(topic, kind = message.type_name(), "Recorded publish");
        self.log.lock().push(Published::Message {
            topic: topic.to_owned(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn set_parameter(&self, node: &str, parameter: &str, value: &Value) -> Result<()> {
        let node = require_name("node", node)?;
        let parameter = require_name("parameter", parameter)?;
        self.log.lock().push(Published::Parameter {
            node: node.to_owned(),
            parameter: parameter.to_owned(),
            value: value.clone(),
        });
        Ok(())
    }
}
