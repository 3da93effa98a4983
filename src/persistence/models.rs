//! Stored records for heats and lanes, and the JSON seed format.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Event, Heat, HeatId, HeatKey, HeatStatus, Lane, LaneId, RaceTime, Swimmer, SwimmerId,
};

/// A stored lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneRecord {
    /// Lane identifier.
    pub id: LaneId,
    /// Lane number within the heat.
    pub number: u8,
    /// Assigned swimmer.
    pub swimmer_id: Option<SwimmerId>,
    /// Informational coach reference.
    #[serde(default)]
    pub coach: Option<String>,
    /// Recorded final time.
    pub final_time: Option<RaceTime>,
}

impl From<&Lane> for LaneRecord {
    fn from(lane: &Lane) -> Self {
        Self {
            id: lane.id,
            number: lane.number,
            swimmer_id: lane.swimmer,
            coach: lane.coach.clone(),
            final_time: lane.final_time,
        }
    }
}

impl From<LaneRecord> for Lane {
    fn from(record: LaneRecord) -> Self {
        Self {
            id: record.id,
            number: record.number,
            swimmer: record.swimmer_id,
            coach: record.coach,
            final_time: record.final_time,
            staged: None,
        }
    }
}

/// A stored heat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatRecord {
    /// Store identifier.
    pub id: HeatId,
    /// Sequence number within the event.
    pub number: u32,
    /// Lifecycle status.
    pub status: HeatStatus,
    /// Optimistic-concurrency token; bumped on every write.
    pub version: u64,
    /// Reset counter; bumped when a running heat goes back to assignment.
    #[serde(default)]
    pub epoch: u32,
    /// Lanes ordered by number.
    pub lanes: Vec<LaneRecord>,
}

impl From<HeatRecord> for Heat {
    fn from(record: HeatRecord) -> Self {
        let mut lanes: Vec<Lane> = record.lanes.into_iter().map(Lane::from).collect();
        lanes.sort_by_key(|l| l.number);
        Self {
            key: HeatKey::Persisted {
                id: record.id,
                number: record.number,
            },
            status: record.status,
            lanes,
            version: Some(record.version),
            epoch: record.epoch,
            standings: None,
        }
    }
}

/// A heat about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHeat {
    /// Sequence number within the event.
    pub number: u32,
    /// Lane layout. Swimmers are written by a following
    /// [`super::HeatStore::save_assignments`].
    pub lanes: Vec<LaneRecord>,
}

impl NewHeat {
    /// Lane layout of `lanes` with no swimmers and no times.
    #[must_use]
    pub fn empty(number: u32, lanes: &[Lane]) -> Self {
        Self {
            number,
            lanes: lanes
                .iter()
                .map(|l| LaneRecord {
                    swimmer_id: None,
                    final_time: None,
                    ..LaneRecord::from(l)
                })
                .collect(),
        }
    }
}

/// New occupant of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneAssignment {
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Swimmer, or `None` to empty the lane.
    pub swimmer_id: Option<SwimmerId>,
}

/// Final time of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneResult {
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Final time.
    pub final_time: RaceTime,
}

/// Everything stored about one event's heats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetRecord {
    /// Heats ordered by number.
    pub heats: Vec<HeatRecord>,
    /// Whether the event was finished.
    pub finished: bool,
    /// Swimmers marked absent at finish.
    pub absent: BTreeSet<SwimmerId>,
}

/// One event of a [`MeetSeed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedEvent {
    /// Event configuration.
    #[serde(flatten)]
    pub event: Event,
    /// Swimmers entered in the event.
    #[serde(default)]
    pub swimmers: Vec<Swimmer>,
    /// Heats already drawn.
    #[serde(default)]
    pub heats: Vec<HeatRecord>,
}

/// JSON seed for the in-memory store.
///
/// ```json
/// { "events": [ { "id": "...", "title": "...", "laneCount": 4,
///                 "stroke": "freestyle", "generalDistance": 200,
///                 "swimmers": [ { "id": "...", "name": "...",
///                                 "birthDate": "2017-03-01" } ] } ] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetSeed {
    /// Seeded events.
    #[serde(default)]
    pub events: Vec<SeedEvent>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn record_becomes_persisted_heat() {
        let id = HeatId::new();
        let record = HeatRecord {
            id,
            number: 3,
            status: HeatStatus::Completed,
            version: 7,
            epoch: 2,
            lanes: vec![
                LaneRecord {
                    id: LaneId::new(),
                    number: 2,
                    swimmer_id: Some(SwimmerId::new()),
                    coach: None,
                    final_time: Some(RaceTime::from_millis(31_980)),
                },
                LaneRecord {
                    id: LaneId::new(),
                    number: 1,
                    swimmer_id: None,
                    coach: Some("Coach Rivera".to_string()),
                    final_time: None,
                },
            ],
        };
        let heat = Heat::from(record);
        assert_eq!(heat.key, HeatKey::Persisted { id, number: 3 });
        assert_eq!(heat.version, Some(7));
        assert_eq!(heat.epoch, 2);
        assert_eq!(heat.lanes.first().map(|l| l.number), Some(1));
        assert!(heat.lanes.iter().all(|l| l.staged.is_none()));
    }

    #[test]
    fn new_heat_drops_occupants() {
        let mut heat = Heat::provisional(2, 1..=3);
        if let Some(lane) = heat.lanes.first_mut() {
            lane.swimmer = Some(SwimmerId::new());
        }
        let new = NewHeat::empty(2, &heat.lanes);
        assert_eq!(new.lanes.len(), 3);
        assert!(new.lanes.iter().all(|l| l.swimmer_id.is_none()));
        assert_eq!(new.lanes.first().map(|l| l.id), heat.lanes.first().map(|l| l.id));
    }

    #[test]
    fn seed_parses_minimal_event() {
        let json = r#"{
            "events": [{
                "id": "6f1c1e0a-3d7c-4f57-9d1e-1f2a3b4c5d6e",
                "title": "200m Freestyle",
                "laneCount": 4,
                "stroke": "freestyle",
                "generalDistance": 200,
                "categoryDistanceOverrides": { "pre_minima": 100 },
                "swimmers": [{
                    "id": "0b7e2a58-2f0e-4b8e-8a43-5f1b9a0c7d11",
                    "name": "Ana",
                    "birthDate": "2019-05-02"
                }]
            }]
        }"#;
        let Ok(seed) = serde_json::from_str::<MeetSeed>(json) else {
            panic!("seed rejected");
        };
        let Some(event) = seed.events.first() else {
            panic!("no event");
        };
        assert_eq!(event.event.lane_count, 4);
        assert_eq!(event.swimmers.len(), 1);
        assert!(event.heats.is_empty());
    }
}
