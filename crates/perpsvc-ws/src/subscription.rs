//! Subscription bookkeeping across reconnects.
//!
//! The wanted set survives reconnects and is replayed on every new
//! socket; acks are cleared on disconnect.

use crate::message::Subscription;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Default)]
pub struct SubscriptionManager {
    /// Insertion order is the replay order.
    wanted: RwLock<Vec<Subscription>>,
    acked: RwLock<HashSet<String>>,
    /// Data messages seen per channel since the last connect.
    received: RwLock<HashMap<String, u64>>,
}

impl SubscriptionManager {
    pub fn new(initial: Vec<Subscription>) -> Self {
        let manager = Self::default();
        for sub in initial {
            manager.add(sub);
        }
        manager
    }

    /// Returns false if already wanted.
    pub fn add(&self, sub: Subscription) -> bool {
        let mut wanted = self.wanted.write();
        if wanted.contains(&sub) {
            return false;
        }
        wanted.push(sub);
        true
    }

    pub fn wanted(&self) -> Vec<Subscription> {
        self.wanted.read().clone()
    }

    pub fn mark_acked(&self, key: String) {
        debug!(subscription = %key, "Subscription acknowledged");
        self.acked.write().insert(key);
    }

    pub fn is_acked(&self, sub: &Subscription) -> bool {
        self.acked.read().contains(&sub.key())
    }

    /// Every wanted subscription has been acknowledged.
    pub fn is_ready(&self) -> bool {
        let acked = self.acked.read();
        self.wanted.read().iter().all(|s| acked.contains(&s.key()))
    }

    pub fn record_message(&self, channel: &str) {
        *self.received.write().entry(channel.to_string()).or_insert(0) += 1;
    }

    pub fn message_count(&self, channel: &str) -> u64 {
        self.received.read().get(channel).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.acked.write().clear();
        self.received.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_after_all_acks() {
        let subs = SubscriptionManager::new(vec![Subscription::AllMids, Subscription::l2_book("BTC")]);
        assert!(!subs.is_ready());
        subs.mark_acked("allMids".to_string());
        assert!(!subs.is_ready());
        subs.mark_acked("l2Book:BTC".to_string());
        assert!(subs.is_ready());

        subs.reset();
        assert!(!subs.is_ready());
        assert_eq!(subs.wanted().len(), 2);
    }

    #[test]
    fn test_add_is_idempotent() {
        let subs = SubscriptionManager::new(vec![Subscription::AllMids]);
        assert!(subs.add(Subscription::trades("ETH")));
        assert!(!subs.add(Subscription::trades("ETH")));
        assert_eq!(subs.wanted().len(), 2);
    }

    #[test]
    fn test_message_counts() {
        let subs = SubscriptionManager::default();
        subs.record_message("l2Book");
        subs.record_message("l2Book");
        assert_eq!(subs.message_count("l2Book"), 2);
        subs.reset();
        assert_eq!(subs.message_count("l2Book"), 0);
    }
}
