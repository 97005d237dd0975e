//! Topic subscription index: shipment topic to interested identities.

use std::collections::{HashMap, HashSet};

/// Inverse index from topic to subscriber identities.
///
/// Subscribe and unsubscribe are idempotent. A topic entry exists only while
/// it has at least one subscriber, so `topic_count` doubles as the
/// active-topic gauge.
#[derive(Default)]
pub struct TopicIndex {
    topics: HashMap<String, HashSet<String>>,
}

impl TopicIndex {
    /// Returns true when the identity was newly added to the topic.
    pub fn subscribe(&mut self, topic: &str, identity: &str) -> bool {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(identity.to_string())
    }

    /// Returns true when the identity was actually subscribed. Drops the
    /// topic entry when its last subscriber leaves.
    pub fn unsubscribe(&mut self, topic: &str, identity: &str) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(identity);
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    pub fn subscribers_of(&self, topic: &str) -> Option<&HashSet<String>> {
        self.topics.get(topic)
    }

    /// Purge the identity from every topic it appears in. Used on eviction
    /// so no identity outlives its registry entry here.
    pub fn remove_identity_everywhere(&mut self, identity: &str) {
        self.topics.retain(|_, subscribers| {
            subscribers.remove(identity);
            !subscribers.is_empty()
        });
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
