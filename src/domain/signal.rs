//! Signals exchanged over an event's broadcast channel.
//!
//! The controller publishes every variant. Timing stations send
//! [`MeetSignal::LaneTimeSubmitted`]; the gateway relays each accepted
//! submission on the same channel so scoreboards see live times. Heat
//! scoped signals carry the heat's epoch so receivers can discard ones that
//! were overtaken by a reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time_collector::HeatTag;
use super::{HeatId, LaneId, RaceTime, SwimmerId};

/// One lane of a `swimmers-assigned` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedLane {
    /// Lane identifier.
    pub lane_id: LaneId,
    /// Lane number.
    pub lane_number: u8,
    /// Assigned swimmer.
    pub swimmer_id: SwimmerId,
    /// Swimmer's display name.
    pub swimmer_name: String,
}

/// Control and timing signals of a meet event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum MeetSignal {
    /// A heat started running.
    HeatStart {
        /// Heat sequence number.
        heat_number: u32,
        /// Epoch of the running attempt.
        epoch: u32,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },

    /// A running heat was reset; `epoch` is the new epoch.
    HeatReset {
        /// Heat sequence number.
        heat_number: u32,
        /// Epoch after the reset.
        epoch: u32,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },

    /// The controller moved to another heat.
    HeatChanged {
        /// Sequence number of the new active heat.
        heat_number: u32,
        /// Heats known to the controller, provisional ones included.
        total_heats: u32,
        /// Epoch of the new active heat.
        epoch: u32,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },

    /// Lane assignments of a heat were saved.
    SwimmersAssigned {
        /// Heat sequence number.
        heat_number: u32,
        /// Store id of the heat.
        heat_id: HeatId,
        /// Epoch of the heat.
        epoch: u32,
        /// Occupied lanes after the save.
        assignments: Vec<AssignedLane>,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },

    /// A station reported a lane's final time.
    LaneTimeSubmitted {
        /// Heat the station believes is running.
        heat_number: u32,
        /// Epoch the station believes is current.
        epoch: u32,
        /// Lane identifier.
        lane_id: LaneId,
        /// Lane number.
        lane_number: u8,
        /// Final time.
        final_time: RaceTime,
        /// Station wall-clock time of the submission.
        timestamp: DateTime<Utc>,
    },

    /// The event is over; remaining swimmers were marked absent.
    EventFinished {
        /// Swimmers marked absent.
        absent_swimmer_ids: Vec<SwimmerId>,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
}

impl MeetSignal {
    /// Returns the (heat, epoch) tag of heat-scoped signals.
    #[must_use]
    pub const fn tag(&self) -> Option<HeatTag> {
        match self {
            Self::HeatStart {
                heat_number, epoch, ..
            }
            | Self::HeatReset {
                heat_number, epoch, ..
            }
            | Self::HeatChanged {
                heat_number, epoch, ..
            }
            | Self::SwimmersAssigned {
                heat_number, epoch, ..
            }
            | Self::LaneTimeSubmitted {
                heat_number, epoch, ..
            } => Some(HeatTag::new(*heat_number, *epoch)),
            Self::EventFinished { .. } => None,
        }
    }

    /// Returns the signal type as it appears on the wire.
    #[must_use]
    pub const fn signal_type(&self) -> &'static str {
        match self {
            Self::HeatStart { .. } => "heat-start",
            Self::HeatReset { .. } => "heat-reset",
            Self::HeatChanged { .. } => "heat-changed",
            Self::SwimmersAssigned { .. } => "swimmers-assigned",
            Self::LaneTimeSubmitted { .. } => "lane-time-submitted",
            Self::EventFinished { .. } => "event-finished",
        }
    }
}
