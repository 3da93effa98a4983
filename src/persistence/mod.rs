//! Persistence layer: heat store and meet directory.
//!
//! [`HeatStore`] is the durable home of heats and lanes. Every write to an
//! existing heat carries the version the caller read; a mismatch fails
//! with [`GatewayError::ConcurrentModification`] and changes nothing.
//! [`MeetDirectory`] is the read-only source of event configuration and
//! swimmers.
//!
//! Two implementations are provided: [`memory::InMemoryStore`] for
//! development and tests, and [`postgres::PostgresStore`] on `sqlx`.

use async_trait::async_trait;

use crate::domain::{Event, EventId, HeatId, HeatStatus, Swimmer, SwimmerId};
use crate::error::GatewayError;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryStore;
pub use models::{HeatRecord, LaneAssignment, LaneRecord, LaneResult, MeetRecord, MeetSeed, NewHeat};
pub use postgres::PostgresStore;

/// Durable storage of heats with optimistic concurrency.
///
/// Implementations must be `Send + Sync`; they are shared across request
/// handlers behind an `Arc`.
#[async_trait]
pub trait HeatStore: Send + Sync + std::fmt::Debug {
    /// Loads every heat of an event plus its finished state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn load_meet(&self, event_id: EventId) -> Result<MeetRecord, GatewayError>;

    /// Creates a heat. The stored heat starts at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConcurrentModification`] when a heat with
    /// the same number already exists for the event.
    async fn create_heat(
        &self,
        event_id: EventId,
        heat: NewHeat,
    ) -> Result<HeatRecord, GatewayError>;

    /// Writes lane assignments and bumps the version. Returns the new
    /// version.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConcurrentModification`] on version
    /// mismatch.
    async fn save_assignments(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        assignments: &[LaneAssignment],
    ) -> Result<u64, GatewayError>;

    /// Moves a heat to `status`, clearing every lane's final time. Used for
    /// start and reset. Moving a running heat back to
    /// [`HeatStatus::AssigningSwimmers`] also bumps its stored epoch.
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConcurrentModification`] on version
    /// mismatch.
    async fn update_status(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        status: HeatStatus,
    ) -> Result<u64, GatewayError>;

    /// Writes lane final times and marks the heat completed, in one
    /// versioned write. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConcurrentModification`] on version
    /// mismatch.
    async fn record_results(
        &self,
        event_id: EventId,
        heat_id: HeatId,
        expected_version: u64,
        results: &[LaneResult],
    ) -> Result<u64, GatewayError>;

    /// Marks the event finished and `absent` swimmers as absent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn finish_event(
        &self,
        event_id: EventId,
        absent: &[SwimmerId],
    ) -> Result<(), GatewayError>;
}

/// Read-only source of event configuration and entered swimmers.
#[async_trait]
pub trait MeetDirectory: Send + Sync + std::fmt::Debug {
    /// Event configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] for unknown events.
    async fn event(&self, event_id: EventId) -> Result<Event, GatewayError>;

    /// Swimmers entered in the event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::EventNotFound`] for unknown events.
    async fn swimmers(&self, event_id: EventId) -> Result<Vec<Swimmer>, GatewayError>;
}
