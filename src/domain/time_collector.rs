//! Collection of lane times for the running heat.
//!
//! Stations deliver times over a channel with no ordering or delivery
//! guarantee, so every submission carries the (heat number, epoch) it was
//! made for. Anything not tagged with the open collection's tag is stale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::heat::Heat;
use super::{LaneId, RaceTime};

/// (heat number, epoch) pair identifying one attempt at running a heat.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct HeatTag {
    /// Heat sequence number.
    pub heat_number: u32,
    /// Reset counter of that heat.
    pub epoch: u32,
}

impl HeatTag {
    /// Creates a tag.
    #[must_use]
    pub const fn new(heat_number: u32, epoch: u32) -> Self {
        Self { heat_number, epoch }
    }
}

/// Result of [`TimeCollector::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First time for the lane in this attempt.
    Recorded,
    /// A different time replaced the previous one.
    Replaced {
        /// The time that was overwritten.
        previous: RaceTime,
    },
    /// The same time was submitted again; nothing changed.
    Unchanged,
    /// The tag does not match the open collection; the submission was
    /// dropped.
    Stale {
        /// Tag of the open collection, if any.
        active: Option<HeatTag>,
    },
}

impl SubmitOutcome {
    /// Whether the collector's state changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Recorded | Self::Replaced { .. })
    }
}

/// Per-heat map of lane times, open only while a heat is running.
#[derive(Debug, Default)]
pub struct TimeCollector {
    active: Option<HeatTag>,
    times: BTreeMap<LaneId, RaceTime>,
}

impl TimeCollector {
    /// Creates a closed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens collection for `tag`, discarding any previous times.
    pub fn open(&mut self, tag: HeatTag) {
        self.active = Some(tag);
        self.times.clear();
    }

    /// Closes collection, returning the collected times.
    pub fn close(&mut self) -> BTreeMap<LaneId, RaceTime> {
        self.active = None;
        std::mem::take(&mut self.times)
    }

    /// Tag of the open collection.
    #[must_use]
    pub const fn active(&self) -> Option<HeatTag> {
        self.active
    }

    /// Stores `time` for `lane_id` if `tag` matches the open collection.
    /// The latest arrival wins; embedded timestamps are not consulted.
    pub fn submit(&mut self, tag: HeatTag, lane_id: LaneId, time: RaceTime) -> SubmitOutcome {
        if self.active != Some(tag) {
            return SubmitOutcome::Stale {
                active: self.active,
            };
        }
        match self.times.insert(lane_id, time) {
            None => SubmitOutcome::Recorded,
            Some(previous) if previous == time => SubmitOutcome::Unchanged,
            Some(previous) => SubmitOutcome::Replaced { previous },
        }
    }

    /// Time collected for a lane.
    #[must_use]
    pub fn time(&self, lane_id: LaneId) -> Option<RaceTime> {
        self.times.get(&lane_id).copied()
    }

    /// Lanes of `heat` holding a persisted swimmer but no time yet.
    #[must_use]
    pub fn missing(&self, heat: &Heat) -> Vec<LaneId> {
        heat.assigned_lanes()
            .filter(|l| !self.times.contains_key(&l.id))
            .map(|l| l.id)
            .collect()
    }

    /// Whether every lane of `heat` holding a persisted swimmer has a time.
    #[must_use]
    pub fn is_complete(&self, heat: &Heat) -> bool {
        heat.assigned_lanes().all(|l| self.times.contains_key(&l.id))
    }
}
