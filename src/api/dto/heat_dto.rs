//! Read views of heats, lanes, standings and swimmers.
//!
//! Views are flat and carry swimmer names so a controller screen or a
//! scoreboard can render them without a second lookup.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::category;
use crate::domain::{
    Category, Distance, Event, Heat, HeatId, HeatStatus, LaneId, Medal, RaceTime, StagedChange,
    Standing, Swimmer, SwimmerId,
};

/// Swimmer name lookup built from an event's directory.
#[derive(Debug, Default)]
pub struct SwimmerNames<'a>(HashMap<SwimmerId, &'a str>);

impl<'a> SwimmerNames<'a> {
    /// Indexes `swimmers` by id.
    #[must_use]
    pub fn new(swimmers: &'a [Swimmer]) -> Self {
        Self(swimmers.iter().map(|s| (s.id, s.name.as_str())).collect())
    }

    /// Name of `id`, if known.
    #[must_use]
    pub fn get(&self, id: Option<SwimmerId>) -> Option<String> {
        id.and_then(|id| self.0.get(&id)).map(|n| (*n).to_string())
    }
}

/// One lane of a heat.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaneView {
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Lane number.
    pub lane_number: u8,
    /// Saved swimmer.
    pub swimmer_id: Option<SwimmerId>,
    /// Saved swimmer's name.
    pub swimmer_name: Option<String>,
    /// Coach reference.
    pub coach: Option<String>,
    /// Final (or, while running, collected) time in milliseconds.
    pub final_time: Option<RaceTime>,
    /// Whether the lane has an unsaved change.
    pub unsaved: bool,
    /// Swimmer the lane will hold once saved.
    pub pending_swimmer_id: Option<SwimmerId>,
}

/// One row of a heat's standings.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StandingView {
    /// 1-based position; absent for lanes without a time.
    pub position: Option<u32>,
    /// Medal for positions 1 to 3.
    pub medal: Option<Medal>,
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Lane number.
    pub lane_number: u8,
    /// Swimmer.
    pub swimmer_id: Option<SwimmerId>,
    /// Swimmer's name.
    pub swimmer_name: Option<String>,
    /// Time in milliseconds.
    pub final_time: Option<RaceTime>,
    /// Time as shown on a scoreboard (`"31.98"`, `"1:02.37"`).
    pub display_time: Option<String>,
}

impl StandingView {
    /// Builds the view of `standing`.
    #[must_use]
    pub fn new(standing: &Standing, names: &SwimmerNames<'_>) -> Self {
        Self {
            position: standing.position,
            medal: standing.medal,
            lane_id: standing.lane_id,
            lane_number: standing.lane_number,
            swimmer_id: standing.swimmer_id,
            swimmer_name: names.get(standing.swimmer_id),
            final_time: standing.final_time,
            display_time: standing.final_time.map(|t| t.to_string()),
        }
    }

    /// Builds views of a list of standings.
    #[must_use]
    pub fn list(standings: &[Standing], names: &SwimmerNames<'_>) -> Vec<Self> {
        standings.iter().map(|s| Self::new(s, names)).collect()
    }
}

/// A heat as seen by the controller.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeatView {
    /// Store id; absent while the heat is provisional.
    pub heat_id: Option<HeatId>,
    /// Sequence number.
    pub heat_number: u32,
    /// Lifecycle status.
    pub status: HeatStatus,
    /// Stored version, used for optimistic concurrency.
    pub version: Option<u64>,
    /// Reset counter.
    pub epoch: u32,
    /// Lanes by number.
    pub lanes: Vec<LaneView>,
    /// Standings once completed.
    pub standings: Option<Vec<StandingView>>,
}

impl HeatView {
    /// Builds the view of `heat`.
    #[must_use]
    pub fn new(heat: &Heat, names: &SwimmerNames<'_>) -> Self {
        Self {
            heat_id: heat.key.id(),
            heat_number: heat.number(),
            status: heat.status,
            version: heat.version,
            epoch: heat.epoch,
            lanes: heat
                .lanes
                .iter()
                .map(|l| LaneView {
                    lane_id: l.id,
                    lane_number: l.number,
                    swimmer_id: l.swimmer,
                    swimmer_name: names.get(l.swimmer),
                    coach: l.coach.clone(),
                    final_time: l.final_time,
                    unsaved: l.staged.is_some(),
                    pending_swimmer_id: match l.staged {
                        Some(StagedChange::Assign(id)) => Some(id),
                        Some(StagedChange::Clear) | None => None,
                    },
                })
                .collect(),
            standings: heat
                .standings
                .as_deref()
                .map(|s| StandingView::list(s, names)),
        }
    }
}

/// A swimmer with the category and distance resolved for an event.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwimmerView {
    /// Swimmer identifier.
    pub id: SwimmerId,
    /// Full name.
    pub name: String,
    /// Birth date.
    pub birth_date: NaiveDate,
    /// Category on the resolution date.
    pub category: Category,
    /// Distance this swimmer swims in the event.
    pub distance: Distance,
}

impl SwimmerView {
    /// Resolves `swimmer` against `event` as of `on`.
    #[must_use]
    pub fn new(swimmer: &Swimmer, event: &Event, on: NaiveDate) -> Self {
        Self {
            id: swimmer.id,
            name: swimmer.name.clone(),
            birth_date: swimmer.birth_date,
            category: category::category_of(swimmer, on),
            distance: category::resolve(event, swimmer, on),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rank;

    #[test]
    fn heat_view_names_swimmers_and_ranks() {
        let swimmer = Swimmer {
            id: SwimmerId::new(),
            name: "Bea".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or_default(),
        };
        let mut heat = Heat::provisional(1, 1..=2);
        if let Some(lane) = heat.lanes.first_mut() {
            lane.swimmer = Some(swimmer.id);
            lane.final_time = Some(RaceTime::from_millis(62_370));
        }
        if let Some(lane) = heat.lanes.get_mut(1) {
            lane.staged = Some(StagedChange::Assign(SwimmerId::new()));
        }
        heat.standings = Some(rank(&heat));

        let swimmers = [swimmer];
        let names = SwimmerNames::new(&swimmers);
        let view = HeatView::new(&heat, &names);

        assert_eq!(view.heat_id, None);
        let first = view.lanes.first();
        assert_eq!(first.and_then(|l| l.swimmer_name.clone()).as_deref(), Some("Bea"));
        assert!(view.lanes.get(1).is_some_and(|l| l.unsaved && l.pending_swimmer_id.is_some()));
        let podium = view.standings.as_ref().and_then(|s| s.first());
        assert_eq!(podium.and_then(|s| s.display_time.clone()).as_deref(), Some("1:02.37"));
        assert_eq!(podium.and_then(|s| s.medal), Some(Medal::Gold));
    }
}
