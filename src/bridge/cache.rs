//! Last-known topic catalog and message cache.
//!
//! Only the [`MessageRouter`](super::router::MessageRouter) writes here; the
//! rest of the crate reads through the bridge's getters.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::protocol::TopicMessage;

// ============================================================================
// TopicCache
// ============================================================================

/// Topic catalog, latest sample per topic, and board system information.
#[derive(Debug, Default)]
pub(crate) struct TopicCache {
    /// Topic name to topic type.
    topics: BTreeMap<String, String>,
    /// Topic name to latest sample.
    messages: FxHashMap<String, TopicMessage>,
    /// Last SYSTEM payload.
    system_info: Option<Value>,
}

// ============================================================================
// TopicCache - Reads
// ============================================================================

impl TopicCache {
    #[inline]
    pub(crate) fn topics(&self) -> &BTreeMap<String, String> {
        &self.topics
    }

    #[inline]
    pub(crate) fn topic_type(&self, topic: &str) -> Option<&str> {
        self.topics.get(topic).map(String::as_str)
    }

    #[inline]
    pub(crate) fn latest(&self, topic: &str) -> Option<&TopicMessage> {
        self.messages.get(topic)
    }

    #[cfg(test)]
    pub(crate) fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub(crate) fn system_info(&self) -> Option<&Value> {
        self.system_info.as_ref()
    }

    /// Distinct first path segments of all catalog topics, sorted.
    ///
    /// `/rover/imu` and `/rover/odom` both belong to node `rover`.
    pub(crate) fn nodes(&self) -> Vec<String> {
        self.topics
            .keys()
            .filter_map(|name| name.split('/').find(|segment| !segment.is_empty()))
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ============================================================================
// TopicCache - Writes
// ============================================================================

impl TopicCache {
    /// Records the type of one topic. Returns `true` if it changed.
    pub(crate) fn set_topic_type(&mut self, topic: &str, kind: &str) -> bool {
        match self.topics.get(topic) {
            Some(existing) if existing == kind => false,
            _ => {
                self.topics.insert(topic.to_owned(), kind.to_owned());
                true
            }
        }
    }

    /// Replaces the catalog and drops samples of topics no longer in it.
    ///
    /// Returns the pruned topics.
    pub(crate) fn replace_topics(&mut self, topics: BTreeMap<String, String>) -> Vec<String> {
        self.topics = topics;

        let mut pruned: Vec<String> = self
            .messages
            .keys()
            .filter(|name| !self.topics.contains_key(*name))
            .cloned()
            .collect();
        pruned.sort();

        for name in &pruned {
            self.messages.remove(name);
        }
        pruned
    }

    /// Stores the latest sample of a topic.
    pub(crate) fn put_message(&mut self, message: TopicMessage) {
        self.messages.insert(message.topic_name.clone(), message);
    }

    /// Removes a topic from both catalog and message cache.
    ///
    /// Returns `true` if anything was removed.
    pub(crate) fn evict(&mut self, topic: &str) -> bool {
        let had_message = self.messages.remove(topic).is_some();
        let had_type = self.topics.remove(topic).is_some();
        had_message || had_type
    }

    /// Empties the message cache. Returns `true` if it was non-empty.
    pub(crate) fn clear_messages(&mut self) -> bool {
        let had_messages = !self.messages.is_empty();
        self.messages.clear();
        had_messages
    }

    pub(crate) fn set_system_info(&mut self, info: Value) {
        self.system_info = Some(info);
    }
}

// ============================================================================
// Tests
// ============================================================================
