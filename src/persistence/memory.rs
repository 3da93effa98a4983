//! In-memory heat store and meet directory.
//!
//! Used when persistence is disabled and in tests. Applies the same
//! version checks as the database so concurrency conflicts behave
//! identically.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{HeatRecord, LaneAssignment, LaneResult, MeetRecord, MeetSeed, NewHeat};
use super::{HeatStore, MeetDirectory};
use crate::domain::{Event, EventId, HeatId, HeatStatus, Swimmer, SwimmerId};
use crate::error::GatewayError;

#[derive(Debug)]
struct StoredMeet {
    event: Event,
    swimmers: Vec<Swimmer>,
    heats: Vec<HeatRecord>,
    finished: bool,
    absent: BTreeSet<SwimmerId>,
}

impl StoredMeet {
    /// Finds a heat and checks its version before a write.
    fn heat_for_write(
        &mut self,
        heat_id: HeatId,
        expected_version: u64,
    ) -> Result<&mut HeatRecord, GatewayError> {
        let heat = self
            .heats
            .iter_mut()
            .find(|h| h.id == heat_id)
            .ok_or_else(|| GatewayError::PersistenceError(format!("heat {heat_id} not stored")))?;
        if heat.version != expected_version {
            return Err(GatewayError::ConcurrentModification {
                heat: heat.number,
                expected: expected_version,
                actual: heat.version,
            });
        }
        heat.version = heat.version.saturating_add(1);
        Ok(heat)
    }
}

/// [`HeatStore`] and [`MeetDirectory`] held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    meets: RwLock<HashMap<EventId, StoredMeet>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the events of `seed`.
    #[must_use]
    pub fn from_seed(seed: MeetSeed) -> Self {
        let meets = seed
            .events
            .into_iter()
            .map(|e| {
                let mut heats = e.heats;
                heats.sort_by_key(|h| h.number);
                (
                    e.event.id,
                    StoredMeet {
                        event: e.event,
                        swimmers: e.swimmers,
                        heats,
                        finished: false,
                        absent: BTreeSet::new(),
                    },
                )
            })
            .collect();
        Self {
            meets: RwLock::new(meets),
        }
    }

    /// Reads a JSON [`MeetSeed`] from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if the file cannot be
    /// read or parsed.
    pub async fn load_seed(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::PersistenceError(format!("cannot read seed {}: {e}", path.display()))
        })?;
        let seed: MeetSeed = serde_json::from_str(&raw).map_err(|e| {
            GatewayError::PersistenceError(format!("invalid seed {}: {e}", path.display()))
        })?;
        tracing::info!(
            path = %path.display(),
            events = seed.events.len(),
            "loaded meet seed"
        );
        Ok(Self::from_seed(seed))
    }

    /// Adds (or replaces) an event with its swimmers and no heats.
    pub async fn insert_event(&self, event: Event, swimmers: Vec<Swimmer>) {
        self.meets.write().await.insert(
            event.id,
            StoredMeet {
                event,
                swimmers,
                heats: Vec::new(),
                finished: false,
                absent: BTreeSet::new(),
            },
        );
    }
}

fn not_found(event_id: EventId) -> GatewayError {
    GatewayError::EventNotFound(event_id)
}

#[async_trait]
impl HeatStore for InMemoryStore {
    async fn load_meet(&self, event_id: EventId) -> Result<MeetRecord, GatewayError> {
        let meets = self.meets.read().await;
        let meet = meets.get(&event_id).ok_or_else(|| not_found(event_id))?;
        Ok(MeetRecord {
            heats: meet.heats.clone(),
            finished: meet.finished,
            absent: meet.absent.clone(),
        })
    }

    async fn create_heat(
        &self,
        event_id: EventId,
        heat: NewHeat,
    ) -> Result<HeatRecord, GatewayError> {
        let mut meets = self.meets.write().await;
        let meet = meets.get_mut(&event_id).ok_or_else(|| not_found(event_id))?;
        if let Some(existing) = meet.heats.iter().find(|h| h.number == heat.number) {
            return Err(GatewayError::ConcurrentModification {
                heat: heat.number,
                expected: 0,
                actual: existing.version,
            });
        }
        let record = HeatRecord {
            id: HeatId::new(),
            number: heat.number,
            status: HeatStatus::AssigningSwimmers,
            version: 1,
            epoch: 0,
            lanes: heat.lanes,
        };
        meet.heats.push(record.clone());
        meet.heats.sort_by_key(|h| h.number);
        Ok(record)
    }

    async fn save_assignments(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        assignments: &[LaneAssignment],
    ) -> Result<u64, GatewayError> {
        let mut meets = self.meets.write().await;
        let meet = meets.get_mut(&event_id).ok_or_else(|| not_found(event_id))?;
        let heat = meet.heat_for_write(heat_id, expected_version)?;
        for assignment in assignments {
            if let Some(lane) = heat.lanes.iter_mut().find(|l| l.id == assignment.lane_id) {
                lane.swimmer_id = assignment.swimmer_id;
            }
        }
        Ok(heat.version)
    }

    async fn update_status(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        status: HeatStatus,
    ) -> Result<u64, GatewayError> {
        let mut meets = self.meets.write().await;
        let meet = meets.get_mut(&event_id).ok_or_else(|| not_found(event_id))?;
        let heat = meet.heat_for_write(heat_id, expected_version)?;
        if heat.status == HeatStatus::Running && status == HeatStatus::AssigningSwimmers {
            heat.epoch = heat.epoch.saturating_add(1);
        }
        heat.status = status;
        for lane in &mut heat.lanes {
            lane.final_time = None;
        }
        Ok(heat.version)
    }

    async fn record_results(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        results: &[LaneResult],
    ) -> Result<u64, GatewayError> {
        let mut meets = self.meets.write().await;
        let meet = meets.get_mut(&event_id).ok_or_else(|| not_found(event_id))?;
        let heat = meet.heat_for_write(heat_id, expected_version)?;
        for lane in &mut heat.lanes {
            lane.final_time = results
                .iter()
                .find(|r| r.lane_id == lane.id)
                .map(|r| r.final_time);
        }
        heat.status = HeatStatus::Completed;
        Ok(heat.version)
    }

    async fn finish_event(
        &self,
        event_id: EventId,
        absent: &[SwimmerId],
    ) -> Result<(), GatewayError> {
        let mut meets = self.meets.write().await;
        let meet = meets.get_mut(&event_id).ok_or_else(|| not_found(event_id))?;
        meet.finished = true;
        meet.absent.extend(absent.iter().copied());
        Ok(())
    }
}

#[async_trait]
impl MeetDirectory for InMemoryStore {
    async fn event(&self, event_id: EventId) -> Result<Event, GatewayError> {
        self.meets
            .read()
            .await
            .get(&event_id)
            .map(|m| m.event.clone())
            .ok_or_else(|| not_found(event_id))
    }

    async fn swimmers(&self, event_id: EventId) -> Result<Vec<Swimmer>, GatewayError> {
        self.meets
            .read()
            .await
            .get(&event_id)
            .map(|m| m.swimmers.clone())
            .ok_or_else(|| not_found(event_id))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{Distance, Heat, RaceTime, Stroke};

    fn event() -> Event {
        Event {
            id: EventId::new(),
            title: "Butterfly".to_string(),
            lane_count: 3,
            stroke: Stroke::Butterfly,
            general_distance: Distance::meters(50),
            category_distance_overrides: BTreeMap::new(),
            eligible_categories: BTreeSet::new(),
        }
    }

    async fn store_with_heat() -> (InMemoryStore, EventId, HeatRecord) {
        let store = InMemoryStore::new();
        let event = event();
        let id = event.id;
        store.insert_event(event, Vec::new()).await;
        let layout = Heat::provisional(1, 1..=3);
        let Ok(record) = store.create_heat(id, NewHeat::empty(1, &layout.lanes)).await else {
            panic!("create failed");
        };
        (store, id, record)
    }

    #[tokio::test]
    async fn created_heat_starts_at_version_one() {
        let (store, id, record) = store_with_heat().await;
        assert_eq!(record.version, 1);
        let meet = store.load_meet(id).await;
        assert_eq!(meet.map(|m| m.heats.len()).ok(), Some(1));
    }

    #[tokio::test]
    async fn duplicate_heat_number_conflicts() {
        let (store, id, _) = store_with_heat().await;
        let again = store.create_heat(id, NewHeat { number: 1, lanes: Vec::new() }).await;
        assert!(matches!(
            again,
            Err(GatewayError::ConcurrentModification { heat: 1, .. })
        ));
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_change() {
        let (store, id, record) = store_with_heat().await;
        let Some(lane) = record.lanes.first() else {
            panic!("no lanes");
        };
        let assign = [LaneAssignment {
            lane_id: lane.id,
            swimmer_id: Some(SwimmerId::new()),
        }];
        assert_eq!(store.save_assignments(id, record.id, 1, &assign).await.ok(), Some(2));

        let clear = [LaneAssignment {
            lane_id: lane.id,
            swimmer_id: None,
        }];
        let stale = store.save_assignments(id, record.id, 1, &clear).await;
        assert!(matches!(
            stale,
            Err(GatewayError::ConcurrentModification {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        let Ok(meet) = store.load_meet(id).await else {
            panic!("load failed");
        };
        let stored = meet.heats.first().and_then(|h| h.lanes.first());
        assert!(stored.and_then(|l| l.swimmer_id).is_some());
    }

    #[tokio::test]
    async fn results_complete_the_heat() {
        let (store, id, record) = store_with_heat().await;
        let Some(lane) = record.lanes.first() else {
            panic!("no lanes");
        };
        let results = [LaneResult {
            lane_id: lane.id,
            final_time: RaceTime::from_millis(40_000),
        }];
        let Ok(version) = store.record_results(id, record.id, 1, &results).await else {
            panic!("record failed");
        };
        assert_eq!(version, 2);
        let Ok(meet) = store.load_meet(id).await else {
            panic!("load failed");
        };
        let Some(heat) = meet.heats.first() else {
            panic!("heat missing");
        };
        assert_eq!(heat.status, HeatStatus::Completed);
        assert_eq!(
            heat.lanes.first().and_then(|l| l.final_time),
            Some(RaceTime::from_millis(40_000))
        );
    }

    #[tokio::test]
    async fn reset_bumps_the_stored_epoch() {
        let (store, id, record) = store_with_heat().await;
        let started = store
            .update_status(id, record.id, 1, HeatStatus::Running)
            .await;
        assert_eq!(started.ok(), Some(2));
        let reset = store
            .update_status(id, record.id, 2, HeatStatus::AssigningSwimmers)
            .await;
        assert_eq!(reset.ok(), Some(3));
        // Leaving assignment is not a reset.
        let _ = store.update_status(id, record.id, 3, HeatStatus::Running).await;

        let Ok(meet) = store.load_meet(id).await else {
            panic!("load failed");
        };
        let Some(heat) = meet.heats.first() else {
            panic!("heat missing");
        };
        assert_eq!((heat.status, heat.epoch), (HeatStatus::Running, 1));
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.event(EventId::new()).await,
            Err(GatewayError::EventNotFound(_))
        ));
    }
}
