//! Inbound frame dispatch.
//!
//! | Frame | Action |
//! |-------|--------|
//! | PING | Reply with PONG echoing the sequence number |
//! | MSG | Upsert topic type (if present), cache sample, surface `_error` |
//! | TOPICS | Replace catalog, prune samples of vanished topics |
//! | SYSTEM | Store verbatim |
//! | SUB / UNSUB / unknown | Ignored |

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use crate::protocol::{Frame, TopicMessage};

use super::cache::TopicCache;
use super::events::BridgeEvent;

// ============================================================================
// Routed
// ============================================================================

/// Side effects the router cannot perform itself.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Routed {
    /// Frame to send back to the board.
    pub reply: Option<Frame>,
    /// Error the board embedded in a data message.
    pub board_error: Option<String>,
}

// ============================================================================
// MessageRouter
// ============================================================================

/// Sole writer of the [`TopicCache`].
#[derive(Debug, Default)]
pub(crate) struct MessageRouter {
    cache: TopicCache,
}

impl MessageRouter {
    #[inline]
    pub(crate) fn cache(&self) -> &TopicCache {
        &self.cache
    }

    /// Applies one decoded frame, appending change events to `events`.
    ///
    /// `now_ms` is the wall clock used to stamp a PONG reply.
    pub(crate) fn dispatch(&mut self, frame: Frame, now_ms: i64, events: &mut Vec<BridgeEvent>) -> Routed {
        match frame {
            Frame::Ping { seq } => Routed {
                reply: Some(Frame::pong(seq, now_ms)),
                board_error: None,
            },

            Frame::Msg(message) => Routed {
                reply: None,
                board_error: self.on_message(message, events),
            },

            Frame::Topics(topics) => {
                let pruned = self.cache.replace_topics(topics);
                events.push(BridgeEvent::TopicsReplaced);
                events.extend(
                    pruned
                        .into_iter()
                        .map(|topic| BridgeEvent::MessageEvicted { topic }),
                );
                Routed::default()
            }

            Frame::System(info) => {
                self.cache.set_system_info(info);
                events.push(BridgeEvent::SystemInfoUpdated);
                Routed::default()
            }

            other => {
                trace!(tag = other.tag(), "Ignoring frame");
                Routed::default()
            }
        }
    }

    fn on_message(&mut self, message: TopicMessage, events: &mut Vec<BridgeEvent>) -> Option<String> {
        let topic = message.topic_name.clone();

        if let Some(kind) = message.topic_type.as_deref()
            && self.cache.set_topic_type(&topic, kind)
        {
            events.push(BridgeEvent::TopicTypeUpdated {
                topic: topic.clone(),
            });
        }

        let board_error = message.error.clone();
        self.cache.put_message(message);
        events.push(BridgeEvent::MessageUpdated { topic });
        board_error
    }

    /// Drops a fully unsubscribed topic from the caches.
    pub(crate) fn forget_topic(&mut self, topic: &str, events: &mut Vec<BridgeEvent>) {
        if self.cache.evict(topic) {
            events.push(BridgeEvent::MessageEvicted {
                topic: topic.to_owned(),
            });
        }
    }

    pub(crate) fn clear_messages(&mut self, events: &mut Vec<BridgeEvent>) {
        if self.cache.clear_messages() {
            events.push(BridgeEvent::MessagesCleared);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
