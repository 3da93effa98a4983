//! Per-connection subscription manager.
//!
//! Tracks which event channels a WebSocket client listens to and
//! provides server-side signal filtering.

use std::collections::HashSet;

use crate::domain::EventId;

/// Manages the set of event subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed event IDs. If `subscribe_all` is true, this set is ignored.
    event_ids: HashSet<EventId>,
    /// Whether the client subscribes to every event (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses raw ids as sent by clients. Returns the valid ids, whether
    /// the wildcard was present, and the entries that were not ids.
    #[must_use]
    pub fn parse_ids(raw: &[String]) -> (Vec<EventId>, bool, Vec<String>) {
        let mut ids = Vec::new();
        let mut wildcard = false;
        let mut invalid = Vec::new();
        for s in raw {
            if s == "*" {
                wildcard = true;
            } else if let Ok(uuid) = s.parse::<uuid::Uuid>() {
                ids.push(EventId::from_uuid(uuid));
            } else {
                invalid.push(s.clone());
            }
        }
        (ids, wildcard, invalid)
    }

    /// Adds event IDs to the subscription set. `wildcard` subscribes to
    /// every event.
    pub fn subscribe(&mut self, ids: &[EventId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.event_ids.extend(ids.iter().copied());
    }

    /// Removes event IDs from the subscription set. `wildcard` drops the
    /// wildcard.
    pub fn unsubscribe(&mut self, ids: &[EventId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.event_ids.remove(id);
        }
    }

    /// Returns `true` if signals of `event_id` should be forwarded.
    #[must_use]
    pub fn matches(&self, event_id: EventId) -> bool {
        self.subscribe_all || self.event_ids.contains(&event_id)
    }

    /// Returns the number of explicitly subscribed events.
    #[must_use]
    pub fn count(&self) -> usize {
        self.event_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(EventId::new()));
    }

    #[test]
    fn subscribe_specific_event() {
        let mut mgr = SubscriptionManager::new();
        let id = EventId::new();
        mgr.subscribe(&[id], false);
        assert!(mgr.matches(id));
        assert!(!mgr.matches(EventId::new()));
    }

    #[test]
    fn wildcard_matches_everything_until_dropped() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(EventId::new()));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.matches(EventId::new()));
    }

    #[test]
    fn unsubscribe_removes_event() {
        let mut mgr = SubscriptionManager::new();
        let id = EventId::new();
        mgr.subscribe(&[id, EventId::new()], false);
        mgr.unsubscribe(&[id], false);
        assert!(!mgr.matches(id));
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn parse_ids_separates_wildcard_and_garbage() {
        let id = EventId::new();
        let raw = vec![id.to_string(), "*".to_string(), "pool-7".to_string()];
        let (ids, wildcard, invalid) = SubscriptionManager::parse_ids(&raw);
        assert_eq!(ids, vec![id]);
        assert!(wildcard);
        assert_eq!(invalid, vec!["pool-7".to_string()]);
    }
}
