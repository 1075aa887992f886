//! Reference-counted topic subscriptions.
//!
//! The registry only does bookkeeping. It answers two questions for the
//! bridge: does a topic need a SUB or UNSUB on the wire, and is anything
//! still subscribed at all.
//!
//! # Invariants
//!
//! - A topic is present only while its refcount is above zero
//! - The sent set is a subset of the registered topics
//! - The sent set is emptied whenever the socket goes away

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use super::options::is_valid_rate;

// ============================================================================
// Subscription
// ============================================================================

/// One topic wanted by one or more consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Topic name.
    pub topic: String,
    /// Number of consumers holding this subscription.
    pub refcount: u32,
    /// Rate requested from the board.
    pub max_update_rate: f64,
}

/// Result of [`SubscriptionRegistry::acquire`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Acquired {
    /// Rate now stored for the topic.
    pub rate: f64,
    /// A different rate was requested for an existing topic.
    pub rate_changed: bool,
    /// Refcount after the call.
    pub refcount: u32,
}

/// Result of [`SubscriptionRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Released {
    /// Topic was not registered.
    Unknown,
    /// Other consumers still hold the topic.
    Retained(u32),
    /// Last holder left; the topic is gone.
    Removed {
        /// A SUB had been sent on the current socket.
        was_sent: bool,
    },
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Active subscriptions plus the set already sent on the current socket.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    /// Topic name to subscription.
    active: BTreeMap<String, Subscription>,
    /// Topics with a SUB on the current socket.
    sent: FxHashSet<String>,
}

impl SubscriptionRegistry {
    /// Adds one holder to `topic`.
    ///
    /// `requested` is ignored unless it is a finite positive number.
    pub(crate) fn acquire(&mut self, topic: &str, requested: Option<f64>, default_rate: f64) -> Acquired {
        let requested = requested.filter(|rate| is_valid_rate(*rate));

        if let Some(existing) = self.active.get_mut(topic) {
            existing.refcount = existing.refcount.saturating_add(1);
            let rate_changed = match requested {
                Some(rate) if rate != existing.max_update_rate => {
                    existing.max_update_rate = rate;
                    true
                }
                _ => false,
            };
            return Acquired {
                rate: existing.max_update_rate,
                rate_changed,
                refcount: existing.refcount,
            };
        }

        let rate = requested.unwrap_or(default_rate);
        self.active.insert(
            topic.to_owned(),
            Subscription {
                topic: topic.to_owned(),
                refcount: 1,
                max_update_rate: rate,
            },
        );
        Acquired {
            rate,
            rate_changed: false,
            refcount: 1,
        }
    }

    /// Removes one holder from `topic`.
    pub(crate) fn release(&mut self, topic: &str) -> Released {
        let Some(existing) = self.active.get_mut(topic) else {
            return Released::Unknown;
        };

        existing.refcount = existing.refcount.saturating_sub(1);
        if existing.refcount > 0 {
            return Released::Retained(existing.refcount);
        }

        self.active.remove(topic);
        Released::Removed {
            was_sent: self.sent.remove(topic),
        }
    }

    /// Records that a SUB for `topic` went out on the current socket.
    pub(crate) fn mark_sent(&mut self, topic: &str) {
        if self.active.contains_key(topic) {
            self.sent.insert(topic.to_owned());
        }
    }

    #[inline]
    pub(crate) fn is_sent(&self, topic: &str) -> bool {
        self.sent.contains(topic)
    }

    /// Forgets everything sent; called when the socket goes away.
    #[inline]
    pub(crate) fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Topics with a SUB on the current socket, sorted.
    pub(crate) fn sent_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.sent.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// `(topic, rate)` of every active subscription, sorted by topic.
    pub(crate) fn entries(&self) -> Vec<(String, f64)> {
        self.active
            .values()
            .map(|sub| (sub.topic.clone(), sub.max_update_rate))
            .collect()
    }

    /// Drops every subscription.
    pub(crate) fn clear(&mut self) {
        self.active.clear();
        self.sent.clear();
    }

    #[inline]
    pub(crate) fn get(&self, topic: &str) -> Option<&Subscription> {
        self.active.get(topic)
    }

    #[inline]
    pub(crate) fn refcount(&self, topic: &str) -> u32 {
        self.active.get(topic).map_or(0, |sub| sub.refcount)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
