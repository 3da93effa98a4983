//! Heat standings.
//!
//! [`rank`] is total: it never fails, and a heat without times simply
//! produces unranked entries.

use serde::{Deserialize, Serialize};

use super::heat::Heat;
use super::{LaneId, RaceTime, SwimmerId};

/// Medal awarded to the first three positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Medal {
    /// Position 1.
    Gold,
    /// Position 2.
    Silver,
    /// Position 3.
    Bronze,
}

impl Medal {
    /// Medal for a 1-based position, if any.
    #[must_use]
    pub const fn for_position(position: u32) -> Option<Self> {
        match position {
            1 => Some(Self::Gold),
            2 => Some(Self::Silver),
            3 => Some(Self::Bronze),
            _ => None,
        }
    }
}

/// One row of a heat's standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Lane number.
    pub lane_number: u8,
    /// Swimmer in the lane.
    pub swimmer_id: Option<SwimmerId>,
    /// Final time; `None` for unranked rows.
    pub final_time: Option<RaceTime>,
    /// 1-based position among timed lanes; `None` when unranked.
    pub position: Option<u32>,
    /// Medal tier for positions 1 to 3.
    pub medal: Option<Medal>,
}

/// Orders the lanes of `heat` that hold a swimmer or a time.
///
/// Timed lanes come first by time, lane number breaking ties; untimed
/// lanes follow in lane-number order and carry no position.
#[must_use]
pub fn rank(heat: &Heat) -> Vec<Standing> {
    let mut rows: Vec<Standing> = heat
        .lanes
        .iter()
        .filter(|l| l.swimmer.is_some() || l.final_time.is_some())
        .map(|l| Standing {
            lane_id: l.id,
            lane_number: l.number,
            swimmer_id: l.swimmer,
            final_time: l.final_time,
            position: None,
            medal: None,
        })
        .collect();

    // `None` sorts before `Some`, so key on "untimed" first.
    rows.sort_by_key(|r| (r.final_time.is_none(), r.final_time, r.lane_number));

    let mut position = 0u32;
    for row in rows.iter_mut().filter(|r| r.final_time.is_some()) {
        position = position.saturating_add(1);
        row.position = Some(position);
        row.medal = Medal::for_position(position);
    }
    rows
}
