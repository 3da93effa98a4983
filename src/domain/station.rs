//! Station-side view of a heat.
//!
//! A timing station only learns about heat progress from control signals,
//! which may arrive late, twice, or not at all. [`TimingStation`] folds
//! those signals into the latest known (heat, epoch) tag and only produces
//! submissions while it believes its heat is running.

use chrono::Utc;

use super::time_collector::HeatTag;
use super::{EventId, LaneId, MeetSignal, RaceTime, SwimmerId};

/// Effect of a signal on a [`TimingStation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationUpdate {
    /// The signal moved the station's view.
    Applied,
    /// The signal is older than what the station already saw.
    Stale,
    /// The signal does not concern this station.
    Ignored,
}

/// Timing station for one lane number of an event.
#[derive(Debug, Clone)]
pub struct TimingStation {
    event_id: EventId,
    lane_number: u8,
    current: Option<HeatTag>,
    lane_id: Option<LaneId>,
    swimmer: Option<SwimmerId>,
    running: bool,
    finished: bool,
    submitted: Option<RaceTime>,
}

impl TimingStation {
    /// Creates a station that has not seen any signal yet.
    #[must_use]
    pub const fn new(event_id: EventId, lane_number: u8) -> Self {
        Self {
            event_id,
            lane_number,
            current: None,
            lane_id: None,
            swimmer: None,
            running: false,
            finished: false,
            submitted: None,
        }
    }

    /// Event this station times.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Latest (heat, epoch) tag seen.
    #[must_use]
    pub const fn current(&self) -> Option<HeatTag> {
        self.current
    }

    /// Whether the station believes its heat is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Swimmer assigned to this lane in the current heat, if announced.
    #[must_use]
    pub const fn swimmer(&self) -> Option<SwimmerId> {
        self.swimmer
    }

    /// Time this station last submitted for the current attempt.
    #[must_use]
    pub const fn submitted(&self) -> Option<RaceTime> {
        self.submitted
    }

    fn is_stale(&self, tag: HeatTag) -> bool {
        self.current.is_some_and(|current| tag < current)
    }

    /// Folds one control signal into the station's view.
    pub fn observe(&mut self, signal: &MeetSignal) -> StationUpdate {
        if self.finished {
            return StationUpdate::Ignored;
        }
        if let MeetSignal::EventFinished { .. } = signal {
            self.finished = true;
            self.running = false;
            return StationUpdate::Applied;
        }
        if let MeetSignal::LaneTimeSubmitted { .. } = signal {
            return StationUpdate::Ignored;
        }
        let Some(tag) = signal.tag() else {
            return StationUpdate::Ignored;
        };
        if self.is_stale(tag) {
            return StationUpdate::Stale;
        }

        let heat_moved = self.current.map(|c| c.heat_number) != Some(tag.heat_number);
        if heat_moved {
            self.lane_id = None;
            self.swimmer = None;
        }
        let attempt_moved = self.current != Some(tag);
        self.current = Some(tag);

        match signal {
            MeetSignal::HeatStart { .. } => {
                if attempt_moved || !self.running {
                    self.submitted = None;
                }
                self.running = true;
            }
            MeetSignal::HeatReset { .. } | MeetSignal::HeatChanged { .. } => {
                self.running = false;
                self.submitted = None;
            }
            MeetSignal::SwimmersAssigned { assignments, .. } => {
                let mine = assignments.iter().find(|a| a.lane_number == self.lane_number);
                self.lane_id = mine.map(|a| a.lane_id);
                self.swimmer = mine.map(|a| a.swimmer_id);
            }
            MeetSignal::LaneTimeSubmitted { .. } | MeetSignal::EventFinished { .. } => {}
        }
        StationUpdate::Applied
    }

    /// Builds a `lane-time-submitted` signal for `time`, tagged with the
    /// current attempt. Returns `None` unless the heat is running and this
    /// lane's id is known.
    pub fn submit(&mut self, time: RaceTime) -> Option<MeetSignal> {
        if !self.running {
            return None;
        }
        let tag = self.current?;
        let lane_id = self.lane_id?;
        self.submitted = Some(time);
        Some(MeetSignal::LaneTimeSubmitted {
            heat_number: tag.heat_number,
            epoch: tag.epoch,
            lane_id,
            lane_number: self.lane_number,
            final_time: time,
            timestamp: Utc::now(),
        })
    }
}
