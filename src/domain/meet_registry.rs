//! Live controllers, one per event.
//!
//! [`MeetRegistry`] keeps every loaded [`HeatStateMachine`] in a `HashMap`
//! where each entry sits behind its own [`tokio::sync::Mutex`]. Operations
//! on one event are serialized; different events proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::EventId;
use super::heat_machine::HeatStateMachine;

/// Shared handle to one event's controller.
pub type MachineHandle = Arc<Mutex<HeatStateMachine>>;

/// Central store of loaded event controllers.
///
/// The outer `RwLock` only guards membership; the per-event `Mutex` is held
/// for the duration of an operation, store writes included, so that a
/// check and its write cannot interleave with another operation on the
/// same event.
#[derive(Debug, Default)]
pub struct MeetRegistry {
    machines: RwLock<HashMap<EventId, MachineHandle>>,
}

impl MeetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the controller of `event_id`, if loaded.
    pub async fn get(&self, event_id: EventId) -> Option<MachineHandle> {
        self.machines.read().await.get(&event_id).cloned()
    }

    /// Inserts a freshly loaded controller. If another task loaded the same
    /// event first, that controller wins and is returned instead; the
    /// registry never replaces a live controller.
    pub async fn insert(&self, event_id: EventId, machine: HeatStateMachine) -> MachineHandle {
        let mut map = self.machines.write().await;
        Arc::clone(
            map.entry(event_id)
                .or_insert_with(|| Arc::new(Mutex::new(machine))),
        )
    }

    /// Returns the number of loaded events.
    pub async fn len(&self) -> usize {
        self.machines.read().await.len()
    }

    /// Returns `true` if no event is loaded.
    pub async fn is_empty(&self) -> bool {
        self.machines.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDate;

    use super::*;
    use crate::domain::{Distance, Event, Stroke};

    fn machine(id: EventId) -> HeatStateMachine {
        let event = Event {
            id,
            title: "Backstroke".to_string(),
            lane_count: 6,
            stroke: Stroke::Backstroke,
            general_distance: Distance::meters(50),
            category_distance_overrides: BTreeMap::new(),
            eligible_categories: BTreeSet::new(),
        };
        HeatStateMachine::new(event, Vec::new(), Vec::new(), NaiveDate::default())
    }

    #[tokio::test]
    async fn insert_and_get() {
        let registry = MeetRegistry::new();
        let id = EventId::new();
        assert!(registry.get(id).await.is_none());

        registry.insert(id, machine(id)).await;
        let Some(handle) = registry.get(id).await else {
            panic!("event should be loaded");
        };
        assert_eq!(handle.lock().await.event().id, id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn first_insert_wins() {
        let registry = MeetRegistry::new();
        let id = EventId::new();
        let first = registry.insert(id, machine(id)).await;
        let second = registry.insert(id, machine(id)).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
        assert!(!registry.is_empty().await);
    }
}
