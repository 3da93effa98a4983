//! # swim-heat-gateway
//!
//! Live heat and lane coordination engine for swim meets.
//!
//! An event is swum as a sequence of heats, each with a fixed number of
//! lanes. The controller assigns eligible swimmers to lanes, starts a heat,
//! collects lane times from timing stations over a broadcast channel,
//! completes and ranks it, then advances until every swimmer has swum or is
//! marked absent. Resets bump an epoch so that late submissions from an
//! abandoned attempt are dropped.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket, timing stations)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── MeetService (service/)
//!     ├── BroadcastChannel / EventBus (domain/)
//!     │
//!     ├── MeetRegistry → HeatStateMachine (domain/)
//!     │
//!     └── HeatStore: in-memory or PostgreSQL (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod server;
pub mod service;
pub mod ws;
