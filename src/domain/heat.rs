//! Heats and lanes as held by the controller.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ranking::Standing;
use super::{HeatId, LaneId, RaceTime, SwimmerId};

/// Identity of a heat: either not yet stored, or stored under an id.
///
/// Provisional and persisted heats are never compared by id; only the
/// sequence number is shared between the two forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeatKey {
    /// Created in memory; not yet written to the store.
    Provisional {
        /// 1-based sequence number.
        number: u32,
    },
    /// Written to the store.
    Persisted {
        /// Store identifier.
        id: HeatId,
        /// 1-based sequence number.
        number: u32,
    },
}

impl HeatKey {
    /// Returns the heat sequence number.
    #[must_use]
    pub const fn number(&self) -> u32 {
        match self {
            Self::Provisional { number } | Self::Persisted { number, .. } => *number,
        }
    }

    /// Returns the store id for persisted heats.
    #[must_use]
    pub const fn id(&self) -> Option<HeatId> {
        match self {
            Self::Provisional { .. } => None,
            Self::Persisted { id, .. } => Some(*id),
        }
    }
}

/// Lifecycle status of a heat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HeatStatus {
    /// Controller is placing swimmers in lanes.
    AssigningSwimmers,
    /// Race in progress; stations are submitting times.
    Running,
    /// All times in and standings computed.
    Completed,
}

impl HeatStatus {
    /// Returns the status as its wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AssigningSwimmers => "assigning_swimmers",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    /// Parses a wire code produced by [`HeatStatus::as_str`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "assigning_swimmers" => Some(Self::AssigningSwimmers),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for HeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lane change made by the controller but not yet saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "swimmerId", rename_all = "snake_case")]
pub enum StagedChange {
    /// Place this swimmer in the lane.
    Assign(SwimmerId),
    /// Empty the lane.
    Clear,
}

/// One competitor slot within a heat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    /// Lane identifier.
    pub id: LaneId,
    /// Lane number, unique within the heat.
    pub number: u8,
    /// Persisted swimmer assignment.
    pub swimmer: Option<SwimmerId>,
    /// Informational coach reference.
    pub coach: Option<String>,
    /// Recorded final time.
    pub final_time: Option<RaceTime>,
    /// Unsaved change, if any.
    pub staged: Option<StagedChange>,
}

impl Lane {
    /// Creates an empty lane with a fresh id.
    #[must_use]
    pub fn empty(number: u8) -> Self {
        Self {
            id: LaneId::new(),
            number,
            swimmer: None,
            coach: None,
            final_time: None,
            staged: None,
        }
    }

    /// Swimmer the lane will hold once staged changes are saved.
    #[must_use]
    pub fn occupant(&self) -> Option<SwimmerId> {
        match self.staged {
            Some(StagedChange::Assign(swimmer)) => Some(swimmer),
            Some(StagedChange::Clear) => None,
            None => self.swimmer,
        }
    }
}

/// A race within an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heat {
    /// Provisional or persisted identity.
    pub key: HeatKey,
    /// Lifecycle status.
    pub status: HeatStatus,
    /// Lanes ordered by lane number.
    pub lanes: Vec<Lane>,
    /// Optimistic-concurrency token of the stored record; `None` while
    /// provisional.
    pub version: Option<u64>,
    /// Reset counter. Submissions tagged with an older epoch are stale.
    pub epoch: u32,
    /// Standings, present once the heat is completed.
    pub standings: Option<Vec<Standing>>,
}

impl Heat {
    /// Creates a provisional heat with `lane_numbers` empty lanes.
    #[must_use]
    pub fn provisional(number: u32, lane_numbers: impl IntoIterator<Item = u8>) -> Self {
        let mut lanes: Vec<Lane> = lane_numbers.into_iter().map(Lane::empty).collect();
        lanes.sort_by_key(|l| l.number);
        Self {
            key: HeatKey::Provisional { number },
            status: HeatStatus::AssigningSwimmers,
            lanes,
            version: None,
            epoch: 0,
            standings: None,
        }
    }

    /// Returns the heat sequence number.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.key.number()
    }

    /// Looks up a lane by id.
    #[must_use]
    pub fn lane(&self, lane_id: LaneId) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.id == lane_id)
    }

    /// Looks up a lane by id, mutably.
    pub fn lane_mut(&mut self, lane_id: LaneId) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|l| l.id == lane_id)
    }

    /// Lanes holding a persisted swimmer.
    pub fn assigned_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter().filter(|l| l.swimmer.is_some())
    }

    /// Lanes with unsaved changes.
    pub fn staged_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter().filter(|l| l.staged.is_some())
    }

    /// Whether `swimmer` holds a persisted or staged place in this heat.
    #[must_use]
    pub fn holds(&self, swimmer: SwimmerId) -> bool {
        self.lanes.iter().any(|l| l.occupant() == Some(swimmer))
    }

    /// Whether `swimmer` has a recorded time in this heat.
    #[must_use]
    pub fn timed(&self, swimmer: SwimmerId) -> bool {
        self.lanes
            .iter()
            .any(|l| l.swimmer == Some(swimmer) && l.final_time.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_heat_orders_lanes() {
        let heat = Heat::provisional(2, [3, 1, 2]);
        let numbers: Vec<u8> = heat.lanes.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(heat.key, HeatKey::Provisional { number: 2 });
        assert_eq!(heat.key.id(), None);
        assert_eq!(heat.status, HeatStatus::AssigningSwimmers);
    }

    #[test]
    fn occupant_overlays_staged_change() {
        let mut lane = Lane::empty(1);
        let a = SwimmerId::new();
        let b = SwimmerId::new();
        assert_eq!(lane.occupant(), None);

        lane.staged = Some(StagedChange::Assign(a));
        assert_eq!(lane.occupant(), Some(a));

        lane.swimmer = Some(a);
        lane.staged = Some(StagedChange::Assign(b));
        assert_eq!(lane.occupant(), Some(b));

        lane.staged = Some(StagedChange::Clear);
        assert_eq!(lane.occupant(), None);
    }

    #[test]
    fn status_codes_round_trip() {
        for s in [
            HeatStatus::AssigningSwimmers,
            HeatStatus::Running,
            HeatStatus::Completed,
        ] {
            assert_eq!(HeatStatus::from_code(s.as_str()), Some(s));
        }
    }
}
