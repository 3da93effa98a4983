//! Domain layer: meet model, heat lifecycle, and the signal channel.
//!
//! This module contains the server-side domain model: typed identifiers,
//! events and swimmers, the category/distance resolver, heats and lanes,
//! the lane assignment validator, time collection and ranking, the
//! per-event [`HeatStateMachine`], and the broadcast channel that carries
//! [`MeetSignal`]s to timing stations.

pub mod category;
pub mod event_bus;
pub mod heat;
pub mod heat_machine;
pub mod ids;
pub mod meet;
pub mod meet_registry;
pub mod race_time;
pub mod ranking;
pub mod signal;
pub mod station;
pub mod time_collector;
pub mod validator;

pub use category::Category;
pub use event_bus::{BroadcastChannel, ChannelMessage, EventBus, Subscription, TransportError};
pub use heat::{Heat, HeatKey, HeatStatus, Lane, StagedChange};
pub use heat_machine::{Advance, AdvanceDecision, Completion, HeatStateMachine, PendingSave};
pub use ids::{EventId, HeatId, LaneId, SwimmerId};
pub use meet::{Distance, Event, Stroke, Swimmer};
pub use meet_registry::{MachineHandle, MeetRegistry};
pub use race_time::{ParseRaceTimeError, RaceTime};
pub use ranking::{Medal, Standing, rank};
pub use signal::{AssignedLane, MeetSignal};
pub use station::{StationUpdate, TimingStation};
pub use time_collector::{HeatTag, SubmitOutcome, TimeCollector};
pub use validator::{Eligibility, LaneAssignmentValidator, Rejection};
