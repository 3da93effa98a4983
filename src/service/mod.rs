//! Service layer: business logic orchestration.
//!
//! [`MeetService`] drives the per-event heat state machines, writes
//! through the [`crate::persistence::HeatStore`], and publishes signals on
//! the [`crate::domain::BroadcastChannel`].

pub mod meet_service;

pub use meet_service::{MeetService, MeetSnapshot};
