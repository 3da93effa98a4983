//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase, like the signals on the broadcast channel.
//! Times are integer milliseconds with a `displayTime` string where a
//! scoreboard needs one.

pub mod heat_dto;
pub mod meet_dto;

pub use heat_dto::*;
pub use meet_dto::*;
